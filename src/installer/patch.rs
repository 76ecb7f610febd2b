// Version-gated backports that keep old Vim sources building on current toolchains

use crate::exec;
use crate::http;
use crate::platform::Platform;
use crate::version::{FixedVersion, Semver, to_semver};
use anyhow::Result;
use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;
use std::path::PathBuf;

lazy_static! {
    static ref VV_FILLER: Regex = Regex::new(r"char[ \t]*vv_filler").expect("vv_filler pattern");
}

/// Files a patch rule may read, rewrite, or apply a diff to
#[async_trait::async_trait]
pub trait SourceTree: Send + Sync {
    async fn read(&self, file: &str) -> Result<String>;

    async fn write(&self, file: &str, content: &str) -> Result<()>;

    /// True when the diff at `url` is already part of the tree
    async fn diff_applied(&self, url: &str, exclude: &[&str]) -> Result<bool>;

    async fn apply_diff(&self, url: &str, exclude: &[&str]) -> Result<()>;
}

pub enum PatchAction {
    /// Apply an upstream diff, leaving `exclude` untouched
    Diff {
        url: &'static str,
        exclude: &'static [&'static str],
    },
    /// Rewrite one file. `None` from `edit` means nothing to change.
    Edit {
        file: &'static str,
        edit: fn(&str) -> Option<String>,
    },
}

pub struct PatchRule {
    pub platform: Platform,
    /// Applied only to versions strictly below this one
    pub below: &'static str,
    pub summary: &'static str,
    pub action: PatchAction,
}

/// Ascending by `below`
pub const RULES: &[PatchRule] = &[
    PatchRule {
        platform: Platform::MacOs,
        below: "7.4.55",
        summary: "conflicting types for 'sigaltstack' (7.4.055)",
        action: PatchAction::Diff {
            url: "https://github.com/vim/vim/compare/v7.4.054...v7.4.055.diff",
            exclude: &["src/version.c"],
        },
    },
    PatchRule {
        platform: Platform::MacOs,
        below: "7.4.1648",
        summary: "vimvars crash with Trace/BPT trap (7.4.1648, eval.c)",
        action: PatchAction::Edit {
            file: "src/eval.c",
            edit: shrink_vimvar_items,
        },
    },
    PatchRule {
        platform: Platform::MacOs,
        below: "7.4.1648",
        summary: "vimvars crash with Trace/BPT trap (7.4.1648, structs.h)",
        action: PatchAction::Edit {
            file: "src/structs.h",
            edit: define_dictitem16,
        },
    },
    PatchRule {
        platform: Platform::MacOs,
        below: "8.2.1119",
        summary: "uint32_t configure check fails with Xcode 12 (8.2.1119)",
        action: PatchAction::Edit {
            file: "src/auto/configure",
            edit: fix_uint32_check,
        },
    },
];

fn map_lines(content: &str, mut f: impl FnMut(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(content.len());
    for line in content.split_inclusive('\n') {
        let (body, ending) = match line.strip_suffix('\n') {
            Some(body) => (body, "\n"),
            None => (line, ""),
        };
        if let Some(body) = f(body) {
            out.push_str(&body);
            out.push_str(ending);
        }
    }
    out
}

/// Switch the vimvars table to 16-byte dict items and drop the filler field
pub fn shrink_vimvar_items(content: &str) -> Option<String> {
    if content.contains("dictitem16_T") {
        return None;
    }

    let mut window: usize = 0;
    let patched = map_lines(content, |line| {
        if line.contains("static struct vimvar") {
            window = 5;
        }
        let in_window = window > 0;
        window = window.saturating_sub(1);

        if VV_FILLER.is_match(line) {
            return None;
        }
        if line.contains("#define VV_NAME") {
            if let Some(stripped) = line.strip_suffix(", {0}") {
                return Some(stripped.to_string());
            }
        }
        if in_window && line.contains("dictitem_T") {
            return Some(line.replacen("dictitem_T", "dictitem16_T", 1));
        }
        Some(line.to_string())
    });

    (patched != content).then_some(patched)
}

const DICTITEM16: &str = "struct dictitem16_S {\n  typval_T di_tv;\n  char_u di_flags;\n  char_u di_key[17];\n};\ntypedef struct dictitem16_S dictitem16_T;";

pub fn define_dictitem16(content: &str) -> Option<String> {
    if content.contains("struct dictitem16_S") {
        return None;
    }
    let mut found = false;
    let patched = map_lines(content, |line| {
        if !found && line.contains("typedef struct dictitem_S dictitem_T;") {
            found = true;
            return Some(format!("{}\n{}", line, DICTITEM16));
        }
        Some(line.to_string())
    });
    found.then_some(patched)
}

/// Use `return` instead of `exit()` in the uint32_t run test
pub fn fix_uint32_check(content: &str) -> Option<String> {
    let mut in_check = false;
    let patched = map_lines(content, |line| {
        if line.contains("nr2 + 1 != 0) exit(1);") {
            in_check = true;
            return Some(line.replacen("exit(1);", "return 1;", 1));
        }
        if in_check {
            in_check = false;
            if line.trim() == "exit(0);" {
                return Some(line.replacen("exit(0);", "return 0;", 1));
            }
        }
        Some(line.to_string())
    });
    (patched != content).then_some(patched)
}

/// Apply every rule for `platform` whose bound is above `version`.
///
/// Each rule checks whether its change is already present, so running this
/// twice leaves the tree as running it once. Versions that are not
/// numeric (commit hashes) get no patches. Returns the applied summaries.
pub async fn backport(
    tree: &dyn SourceTree,
    platform: Platform,
    version: &FixedVersion,
) -> Result<Vec<&'static str>> {
    let Some(version) = to_semver(version.as_str()) else {
        return Ok(Vec::new());
    };

    let mut applied = Vec::new();
    for rule in RULES.iter().filter(|r| r.platform == platform) {
        let active = Semver::parse(rule.below).is_some_and(|bound| version < bound);
        if !active {
            continue;
        }

        let changed = match &rule.action {
            PatchAction::Diff { url, exclude } => {
                if tree.diff_applied(url, exclude).await? {
                    false
                } else {
                    tree.apply_diff(url, exclude).await?;
                    true
                }
            }
            PatchAction::Edit { file, edit } => match edit(&tree.read(file).await?) {
                Some(patched) => {
                    tree.write(file, &patched).await?;
                    true
                }
                None => false,
            },
        };

        if changed {
            info!("Backported: {}", rule.summary);
            applied.push(rule.summary);
        } else {
            debug!("Already patched: {}", rule.summary);
        }
    }
    Ok(applied)
}

/// A git checkout on disk
pub struct Checkout {
    root: PathBuf,
}

impl Checkout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn fetch_diff(&self, url: &str) -> Result<PathBuf> {
        let path = self.root.join(".git").join("setup-vim-backport.diff");
        http::download_to_file(url, &path).await?;
        Ok(path)
    }

    fn apply_args<'a>(diff: &'a str, exclude: &[&'a str], check_reverse: bool) -> Vec<&'a str> {
        let mut args = vec!["apply"];
        if check_reverse {
            args.extend(["--check", "--reverse"]);
        }
        for path in exclude {
            args.extend(["--exclude", *path]);
        }
        args.push(diff);
        args
    }
}

#[async_trait::async_trait]
impl SourceTree for Checkout {
    async fn read(&self, file: &str) -> Result<String> {
        let path = self.root.join(file);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))
    }

    async fn write(&self, file: &str, content: &str) -> Result<()> {
        tokio::fs::write(self.root.join(file), content).await?;
        Ok(())
    }

    async fn diff_applied(&self, url: &str, exclude: &[&str]) -> Result<bool> {
        let diff = self.fetch_diff(url).await?;
        let diff = diff.to_string_lossy();
        let args = Self::apply_args(&diff, exclude, true);
        Ok(exec::git(&args, Some(&self.root)).await.is_ok())
    }

    async fn apply_diff(&self, url: &str, exclude: &[&str]) -> Result<()> {
        let diff = self.fetch_diff(url).await?;
        let diff = diff.to_string_lossy();
        let args = Self::apply_args(&diff, exclude, false);
        exec::git(&args, Some(&self.root)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const EVAL_C: &str = concat!(
        "#define VV_NAME(s, c)\ts, {{0}}, {0}\n",
        "static struct vimvar\n",
        "{\n",
        "    char\t*vv_name;\n",
        "    dictitem_T\tvv_di;\n",
        "    char\tvv_filler[16];\n",
        "    char\tvv_flags;\n",
        "} vimvars[VV_LEN] =\n",
        "{\n",
        "    dictitem_T\tother;\n",
    );

    const STRUCTS_H: &str = "typedef struct dictitem_S dictitem_T;\n\nstruct listvar_S\n";

    const CONFIGURE: &str = concat!(
        "main() {\n",
        "  uint32_t nr1 = (uint32_t)-1;\n",
        "  uint32_t nr2 = (uint32_t)0xffffffffUL;\n",
        "  if (sizeof(uint32_t) != 4 || nr1 != 0xffffffffUL || nr2 + 1 != 0) exit(1);\n",
        "  exit(0);\n",
        "}\n",
        "exit(0);\n",
    );

    #[derive(Default)]
    struct FakeTree {
        files: Mutex<HashMap<String, String>>,
        diffs: Mutex<Vec<String>>,
    }

    impl FakeTree {
        fn vim_sources() -> Self {
            let tree = FakeTree::default();
            {
                let mut files = tree.files.lock().unwrap();
                files.insert("src/eval.c".into(), EVAL_C.into());
                files.insert("src/structs.h".into(), STRUCTS_H.into());
                files.insert("src/auto/configure".into(), CONFIGURE.into());
            }
            tree
        }

        fn snapshot(&self) -> (HashMap<String, String>, Vec<String>) {
            (
                self.files.lock().unwrap().clone(),
                self.diffs.lock().unwrap().clone(),
            )
        }
    }

    #[async_trait::async_trait]
    impl SourceTree for FakeTree {
        async fn read(&self, file: &str) -> Result<String> {
            self.files
                .lock()
                .unwrap()
                .get(file)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("missing {}", file))
        }

        async fn write(&self, file: &str, content: &str) -> Result<()> {
            self.files.lock().unwrap().insert(file.into(), content.into());
            Ok(())
        }

        async fn diff_applied(&self, url: &str, _exclude: &[&str]) -> Result<bool> {
            Ok(self.diffs.lock().unwrap().iter().any(|d| d == url))
        }

        async fn apply_diff(&self, url: &str, _exclude: &[&str]) -> Result<()> {
            self.diffs.lock().unwrap().push(url.to_string());
            Ok(())
        }
    }

    fn version(v: &str) -> FixedVersion {
        FixedVersion::new(v)
    }

    #[test]
    fn test_rules_are_in_ascending_order() {
        let bounds: Vec<Semver> = RULES.iter().map(|r| Semver::parse(r.below).unwrap()).collect();
        assert!(bounds.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_shrink_vimvar_items() {
        let patched = shrink_vimvar_items(EVAL_C).unwrap();
        assert!(patched.starts_with("#define VV_NAME(s, c)\ts, {{0}}\n"));
        assert!(patched.contains("    dictitem16_T\tvv_di;\n"));
        assert!(!patched.contains("vv_filler"));
        // Outside the vimvar declaration
        assert!(patched.contains("    dictitem_T\tother;\n"));
        assert_eq!(shrink_vimvar_items(&patched), None);
    }

    #[test]
    fn test_define_dictitem16() {
        let patched = define_dictitem16(STRUCTS_H).unwrap();
        assert!(patched.contains(
            "typedef struct dictitem_S dictitem_T;\nstruct dictitem16_S {\n"
        ));
        assert!(patched.contains("typedef struct dictitem16_S dictitem16_T;\n\nstruct listvar_S"));
        assert_eq!(define_dictitem16(&patched), None);
        assert_eq!(define_dictitem16("no anchor here\n"), None);
    }

    #[test]
    fn test_fix_uint32_check() {
        let patched = fix_uint32_check(CONFIGURE).unwrap();
        assert!(patched.contains("nr2 + 1 != 0) return 1;\n  return 0;\n}"));
        // Unrelated exit calls stay
        assert!(patched.ends_with("}\nexit(0);\n"));
        assert_eq!(fix_uint32_check(&patched), None);
    }

    #[tokio::test]
    async fn test_old_version_gets_every_rule() {
        let tree = FakeTree::vim_sources();
        let applied = backport(&tree, Platform::MacOs, &version("v7.4.052")).await.unwrap();
        assert_eq!(applied.len(), RULES.len());

        let (files, diffs) = tree.snapshot();
        assert_eq!(diffs.len(), 1);
        assert!(files["src/eval.c"].contains("dictitem16_T"));
        assert!(files["src/structs.h"].contains("struct dictitem16_S"));
        assert!(files["src/auto/configure"].contains("return 1;"));
    }

    #[tokio::test]
    async fn test_backport_is_idempotent() {
        let tree = FakeTree::vim_sources();
        backport(&tree, Platform::MacOs, &version("v7.4.052")).await.unwrap();
        let once = tree.snapshot();

        let applied = backport(&tree, Platform::MacOs, &version("v7.4.052")).await.unwrap();
        assert!(applied.is_empty());
        assert_eq!(tree.snapshot(), once);
    }

    #[tokio::test]
    async fn test_rule_applies_only_below_its_bound() {
        let tree = FakeTree::vim_sources();
        let applied = backport(&tree, Platform::MacOs, &version("v8.0.0000")).await.unwrap();
        assert_eq!(applied, vec![RULES[3].summary]);
        let (files, diffs) = tree.snapshot();
        assert!(diffs.is_empty());
        assert_eq!(files["src/eval.c"], EVAL_C);

        let tree = FakeTree::vim_sources();
        assert!(backport(&tree, Platform::MacOs, &version("v8.2.1119")).await.unwrap().is_empty());
        assert!(backport(&tree, Platform::MacOs, &version("v7.4.1648")).await.unwrap().len() == 1);
    }

    #[tokio::test]
    async fn test_other_platforms_and_hashes_are_untouched() {
        let tree = FakeTree::vim_sources();
        assert!(backport(&tree, Platform::Linux, &version("v7.4.052")).await.unwrap().is_empty());
        assert!(
            backport(&tree, Platform::MacOs, &version("49cd750d6a72efc0571a89d7a874bbb01081227f"))
                .await
                .unwrap()
                .is_empty()
        );
        let (files, diffs) = tree.snapshot();
        assert!(diffs.is_empty());
        assert_eq!(files["src/eval.c"], EVAL_C);
    }
}
