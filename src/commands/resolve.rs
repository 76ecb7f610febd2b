// Resolve command: print the fixed version a specifier resolves to

use super::Request;
use crate::cli::InstallArgs;
use crate::platform::Platform;
use crate::ui;
use anyhow::Result;
use log::info;

pub async fn resolve(args: &InstallArgs) -> Result<()> {
    let request = Request::from_args(args)?;
    let platform = Platform::current()?;
    let ctx = request.context()?;
    let installer = request.installer(platform, &ctx)?;

    let resolution = installer.resolve_version(&request.spec).await?;
    info!(
        "{} {} resolves to {} ({})",
        request.vim_type,
        request.spec,
        resolution.version,
        installer.install_type()
    );
    ui::plain(resolution.version.as_str());
    Ok(())
}
