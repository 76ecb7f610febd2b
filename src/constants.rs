// Constants module for shared string constants

/// Bumped whenever a change makes previously cached installs unusable.
pub const CACHE_KEY_VERSION: &str = "1.0.6";

/// Installs larger than this are not uploaded to the cache.
pub const CACHE_SIZE_LIMIT: u64 = 400 * 1024 * 1024;

pub const STATE_FILE: &str = "setup-vim-state.toml";
pub const INSTALL_DIR: &str = "vim";

pub const DEFAULT_VIM_TYPE: &str = "vim";
pub const DEFAULT_VIM_VERSION: &str = "head";
pub const DEFAULT_DOWNLOAD: &str = "available";

pub const GITHUB_API: &str = "https://api.github.com";

/// Page size used while walking a repository's release history.
pub const RELEASES_PER_PAGE: u32 = 100;

/// Numbered releases inspected when pinning a symbolic tag to a version.
pub const PERPETUATE_WINDOW: u32 = 10;

/// History depth for clones made only to describe a ref.
pub const RESOLVE_CLONE_DEPTH: u32 = 100;
