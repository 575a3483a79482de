//! Filesystem discovery.
//!
//! Reads the `.tf` files of a root module, its variable files, and every
//! local module it calls, into the `ModuleSource` list the `ModuleGraph`
//! is built from. All file I/O of a scan happens here.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::context::ModuleSource;
use crate::error::{Result, ScanError};
use crate::model::ModelError;
use crate::parser::parse_str;
use crate::syntax::{SyntaxFile, SyntaxBlock};

const MAX_FILE_SIZE: u64 = 4 * 1_048_576;
pub const DEFAULT_MAX_MODULE_DEPTH: usize = 16;

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Extra `.tfvars` files for the root module, applied after the
    /// automatically discovered ones.
    pub var_files: Vec<PathBuf>,
    /// Files matching any of these (by path or file name) are skipped.
    pub exclude_paths: Vec<glob::Pattern>,
    pub max_module_depth: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            var_files: Vec::new(),
            exclude_paths: Vec::new(),
            max_module_depth: DEFAULT_MAX_MODULE_DEPTH,
        }
    }
}

impl LoadOptions {
    pub fn exclude(mut self, pattern: &str) -> Result<Self> {
        let pattern = glob::Pattern::new(pattern)
            .map_err(|e| ScanError::Config(format!("invalid exclude pattern '{pattern}': {e}")))?;
        self.exclude_paths.push(pattern);
        Ok(self)
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        self.exclude_paths.iter().any(|pattern| {
            pattern.matches_path(path) || name.as_deref().map_or(false, |n| pattern.matches(n))
        })
    }
}

#[derive(Debug, Default)]
pub struct LoadedWorkspace {
    /// Root module first, then called modules breadth-first.
    pub modules: Vec<ModuleSource>,
    /// Files that could not be read or parsed.
    pub errors: Vec<ModelError>,
}

impl LoadedWorkspace {
    pub fn file_count(&self) -> usize {
        self.modules.iter().map(|m| m.files.len()).sum()
    }
}

/// Load `root`, a module directory or a single `.tf` file.
pub fn load_workspace(root: &Path, options: &LoadOptions) -> Result<LoadedWorkspace> {
    let metadata = std::fs::metadata(root).map_err(|e| {
        ScanError::Config(format!("cannot read scan target '{}': {e}", root.display()))
    })?;

    let mut workspace = LoadedWorkspace::default();

    let (dir, paths) = if metadata.is_file() {
        let dir = root.parent().map(Path::to_path_buf).unwrap_or_default();
        (dir, vec![root.to_path_buf()])
    } else {
        (root.to_path_buf(), list_files(root, |name| name.ends_with(".tf"), options))
    };

    let files = parse_files(&paths, &mut workspace.errors);
    let mut root_module = ModuleSource::root(dir.clone(), files);
    root_module.variable_files = variable_files(&dir, metadata.is_dir(), options, &mut workspace.errors)?;
    workspace.modules.push(root_module);

    load_called_modules(&mut workspace, options);

    tracing::debug!(
        modules = workspace.modules.len(),
        files = workspace.file_count(),
        errors = workspace.errors.len(),
        "loaded workspace"
    );
    Ok(workspace)
}

/// `terraform.tfvars`, then `*.auto.tfvars` by name, then explicit files.
fn variable_files(
    dir: &Path,
    discover: bool,
    options: &LoadOptions,
    errors: &mut Vec<ModelError>,
) -> Result<Vec<SyntaxFile>> {
    let mut paths = Vec::new();
    if discover {
        let default = dir.join("terraform.tfvars");
        if default.is_file() {
            paths.push(default);
        }
        paths.extend(list_files(dir, |name| name.ends_with(".auto.tfvars"), options));
    }
    for path in &options.var_files {
        if !path.is_file() {
            return Err(ScanError::Config(format!(
                "variable file '{}' does not exist",
                path.display()
            )));
        }
        paths.push(path.clone());
    }
    Ok(parse_files(&paths, errors))
}

fn load_called_modules(workspace: &mut LoadedWorkspace, options: &LoadOptions) {
    // (module index, ancestor dirs including itself)
    let mut queue: VecDeque<(usize, Vec<PathBuf>)> = VecDeque::new();
    queue.push_back((0, vec![canonical(&workspace.modules[0].dir)]));

    while let Some((index, ancestors)) = queue.pop_front() {
        let calls = local_calls(&workspace.modules[index]);
        for (name, source) in calls {
            let dir = module_dir(&workspace.modules[index].dir, &source);
            if !dir.is_dir() {
                tracing::warn!(module = %name, source = %source, "module source not found, outputs stay unknown");
                continue;
            }
            let key = canonical(&dir);
            if ancestors.contains(&key) {
                tracing::warn!(module = %name, dir = %dir.display(), "recursive module call skipped");
                continue;
            }
            if ancestors.len() > options.max_module_depth {
                tracing::warn!(
                    module = %name,
                    depth = ancestors.len(),
                    "module nesting too deep, skipped"
                );
                continue;
            }

            let paths = list_files(&dir, |n| n.ends_with(".tf"), options);
            let files = parse_files(&paths, &mut workspace.errors);
            workspace.modules.push(ModuleSource {
                dir,
                parent: Some(index),
                call_name: Some(name),
                files,
                variable_files: Vec::new(),
            });

            let mut chain = ancestors.clone();
            chain.push(key);
            queue.push_back((workspace.modules.len() - 1, chain));
        }
    }
}

/// `module` blocks with a local (`./`, `../`) source, in file order.
fn local_calls(module: &ModuleSource) -> Vec<(String, String)> {
    module
        .files
        .iter()
        .flat_map(|file| file.body.blocks.iter())
        .filter_map(|block: &SyntaxBlock| match (block.ident.as_str(), block.labels.as_slice()) {
            ("module", [name]) => {
                let source = block.body.get_attribute("source")?.expr.as_str()?;
                if source.starts_with("./") || source.starts_with("../") {
                    Some((name.clone(), source.to_string()))
                } else {
                    tracing::debug!(module = %name, source, "remote module source left unresolved");
                    None
                }
            }
            _ => None,
        })
        .collect()
}

fn list_files(dir: &Path, wanted: impl Fn(&str) -> bool, options: &LoadOptions) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "failed to list directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.file_name()
                .map(|n| wanted(&n.to_string_lossy()))
                .unwrap_or(false)
        })
        .filter(|path| !options.is_excluded(path))
        .collect();
    paths.sort();
    paths
}

fn parse_files(paths: &[PathBuf], errors: &mut Vec<ModelError>) -> Vec<SyntaxFile> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        match read_file(path) {
            Ok(file) => files.push(file),
            Err(message) => {
                tracing::warn!(file = %path.display(), error = %message, "skipping file");
                errors.push(ModelError {
                    file: path.clone(),
                    message,
                    range: None,
                });
            }
        }
    }
    files
}

fn read_file(path: &Path) -> std::result::Result<SyntaxFile, String> {
    let size = std::fs::metadata(path).map_err(|e| e.to_string())?.len();
    if size > MAX_FILE_SIZE {
        return Err(format!("file is larger than {MAX_FILE_SIZE} bytes"));
    }
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    parse_str(path, &content).map_err(|e| match e {
        ScanError::Parse { message, .. } => message,
        other => other.to_string(),
    })
}

/// `base` joined with a relative module source, without `.` components.
fn module_dir(base: &Path, source: &str) -> PathBuf {
    let mut dir = base.to_path_buf();
    for component in Path::new(source).components() {
        if component != std::path::Component::CurDir {
            dir.push(component);
        }
    }
    dir
}

fn canonical(dir: &Path) -> PathBuf {
    dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    fn names(files: &[SyntaxFile]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn loads_tf_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.tf", "locals {}\n");
        write(dir.path(), "a.tf", "locals {}\n");
        write(dir.path(), "notes.md", "# not terraform\n");
        write(dir.path(), "nested/c.tf", "locals {}\n");

        let ws = load_workspace(dir.path(), &LoadOptions::default()).unwrap();
        assert_eq!(ws.modules.len(), 1);
        assert_eq!(names(&ws.modules[0].files), vec!["a.tf", "b.tf"]);
        assert!(ws.errors.is_empty());
    }

    #[test]
    fn single_file_target() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.tf", "locals {}\n");
        write(dir.path(), "b.tf", "locals {}\n");
        let ws = load_workspace(&dir.path().join("b.tf"), &LoadOptions::default()).unwrap();
        assert_eq!(names(&ws.modules[0].files), vec!["b.tf"]);
    }

    #[test]
    fn missing_target_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_workspace(&dir.path().join("absent"), &LoadOptions::default()).is_err());
    }

    #[test]
    fn unparseable_file_becomes_model_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "bad.tf", "resource \"a\" \"b\" {\n");
        write(dir.path(), "good.tf", "locals {}\n");
        let ws = load_workspace(dir.path(), &LoadOptions::default()).unwrap();
        assert_eq!(names(&ws.modules[0].files), vec!["good.tf"]);
        assert_eq!(ws.errors.len(), 1);
        assert!(ws.errors[0].file.ends_with("bad.tf"));
    }

    #[test]
    fn variable_files_in_precedence_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.tf", "variable \"x\" {}\n");
        write(dir.path(), "terraform.tfvars", "x = \"a\"\n");
        write(dir.path(), "b.auto.tfvars", "x = \"c\"\n");
        write(dir.path(), "a.auto.tfvars", "x = \"b\"\n");
        write(dir.path(), "extra/prod.tfvars", "x = \"d\"\n");

        let options = LoadOptions {
            var_files: vec![dir.path().join("extra/prod.tfvars")],
            ..Default::default()
        };
        let ws = load_workspace(dir.path(), &options).unwrap();
        assert_eq!(
            names(&ws.modules[0].variable_files),
            vec!["terraform.tfvars", "a.auto.tfvars", "b.auto.tfvars", "prod.tfvars"]
        );
    }

    #[test]
    fn missing_var_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.tf", "locals {}\n");
        let options = LoadOptions {
            var_files: vec![dir.path().join("nope.tfvars")],
            ..Default::default()
        };
        assert!(matches!(
            load_workspace(dir.path(), &options),
            Err(ScanError::Config(_))
        ));
    }

    #[test]
    fn excluded_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.tf", "locals {}\n");
        write(dir.path(), "generated_override.tf", "locals {}\n");
        let options = LoadOptions::default().exclude("*_override.tf").unwrap();
        let ws = load_workspace(dir.path(), &options).unwrap();
        assert_eq!(names(&ws.modules[0].files), vec!["main.tf"]);
    }

    #[test]
    fn invalid_exclude_pattern_is_rejected() {
        assert!(LoadOptions::default().exclude("[").is_err());
    }

    #[test]
    fn follows_local_modules_breadth_first() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "main.tf",
            r#"
module "net" {
  source = "./modules/net"
}
module "remote" {
  source = "terraform-aws-modules/vpc/aws"
}
module "db" {
  source = "./modules/db"
}
"#,
        );
        write(
            dir.path(),
            "modules/net/main.tf",
            "module \"subnet\" {\n  source = \"../subnet\"\n}\n",
        );
        write(dir.path(), "modules/db/main.tf", "locals {}\n");
        write(dir.path(), "modules/subnet/main.tf", "locals {}\n");

        let ws = load_workspace(dir.path(), &LoadOptions::default()).unwrap();
        let calls: Vec<_> = ws
            .modules
            .iter()
            .map(|m| (m.parent, m.call_name.clone()))
            .collect();
        assert_eq!(
            calls,
            vec![
                (None, None),
                (Some(0), Some("net".to_string())),
                (Some(0), Some("db".to_string())),
                (Some(1), Some("subnet".to_string())),
            ]
        );
    }

    #[test]
    fn recursive_modules_terminate() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.tf", "module \"self\" {\n  source = \"./\"\n}\n");
        let ws = load_workspace(dir.path(), &LoadOptions::default()).unwrap();
        assert_eq!(ws.modules.len(), 1);
    }

    #[test]
    fn depth_limit_applies() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.tf", "module \"a\" {\n  source = \"./a\"\n}\n");
        write(dir.path(), "a/main.tf", "module \"b\" {\n  source = \"./b\"\n}\n");
        write(dir.path(), "a/b/main.tf", "locals {}\n");
        let options = LoadOptions {
            max_module_depth: 1,
            ..Default::default()
        };
        let ws = load_workspace(dir.path(), &options).unwrap();
        assert_eq!(ws.modules.len(), 2);
    }
}
