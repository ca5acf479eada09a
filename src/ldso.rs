use crate::elf::image::{clean_path, confine, ElfImage};
use crate::ldso::LdSoError::{IncludeDepth, InvalidFormat};
use goblin::elf::dynamic::{DT_RPATH, DT_RUNPATH};
use log::{debug, warn};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::{fmt, fs, io};

/// Trusted directories searched after ld.so.conf.
pub const DEFAULT_LIBRARY_DIRS: [&str; 4] =
    ["/lib", "/usr/lib", "/lib64", "/usr/lib64"];

/// How many `DT_NEEDED` hops to follow looking for libc.
const MAX_DEPENDENCY_DEPTH: usize = 8;

#[derive(Clone, Debug)]
pub struct LdSoLookup {
    root: Option<PathBuf>,
    lookup_dirs: Vec<PathBuf>,
}

impl LdSoLookup {
    #[must_use]
    pub fn lookup_dirs(&self) -> &[PathBuf] {
        &self.lookup_dirs
    }
}

pub enum LdSoError {
    /// I/O error
    IO(io::Error),
    /// Invalid format
    InvalidFormat(String),
    /// Pattern error
    Pattern(glob::PatternError, PathBuf),
    /// Globbing error
    Glob(glob::GlobError, PathBuf),
    /// Include depth exhaustion
    IncludeDepth(PathBuf),
}

impl fmt::Display for LdSoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IO(err) => err.fmt(f),
            Self::InvalidFormat(str) => str.fmt(f),
            Self::Pattern(perr, path) => {
                write!(f, "Failed to follow glob {}: {}", path.display(), perr)
            }
            Self::Glob(gerr, path) => {
                write!(f, "Failed to match glob {}: {}", path.display(), gerr)
            }
            Self::IncludeDepth(path) => {
                write!(f, "Maximum include depth reached: {}", path.display())
            }
        }
    }
}

impl fmt::Debug for LdSoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<io::Error> for LdSoError {
    fn from(e: io::Error) -> Self {
        LdSoError::IO(e)
    }
}

/// Place an absolute path from the target filesystem under `root`.
fn reroot(root: Option<&Path>, path: &Path) -> Option<PathBuf> {
    match root {
        Some(root) => confine(root, path)
            .map_err(|err| debug!("{}", err))
            .ok(),
        None => Some(clean_path(path)),
    }
}

fn is_libc(path: &Path) -> bool {
    path.file_name()
        .map_or(false, |name| name.to_string_lossy().contains("libc."))
}

impl LdSoLookup {
    fn parse_ldso_conf_file(
        root: Option<&Path>,
        conffile: &Path,
        include_depth: u8,
    ) -> Result<Vec<PathBuf>, LdSoError> {
        if include_depth > 4 {
            return Err(IncludeDepth(conffile.to_path_buf()));
        }

        let mut lookup_paths: Vec<PathBuf> = Vec::new();
        let content = fs::read_to_string(conffile)?;

        for line in content.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(include_path) = line.strip_prefix("include ") {
                let include_path = include_path.trim();
                if !include_path.starts_with('/') {
                    return Err(InvalidFormat(format!(
                        "Invalid include path: {include_path}"
                    )));
                }
                let pattern = reroot(root, Path::new(include_path))
                    .ok_or_else(|| {
                        InvalidFormat(format!(
                            "Include path escapes root: {include_path}"
                        ))
                    })?;
                for file in glob::glob(&pattern.to_string_lossy())
                    .map_err(|e| LdSoError::Pattern(e, pattern.clone()))?
                {
                    let file =
                        file.map_err(|e| LdSoError::Glob(e, pattern.clone()))?;
                    lookup_paths.append(
                        &mut LdSoLookup::parse_ldso_conf_file(
                            root,
                            &file,
                            include_depth + 1,
                        )?,
                    );
                }
                continue;
            }

            if line.starts_with('/') {
                let dir = line.split('#').next().map(str::trim).ok_or_else(
                    || InvalidFormat(format!("Invalid path line: {line}")),
                )?;
                lookup_paths.extend(reroot(root, Path::new(dir)));
                continue;
            }

            return Err(InvalidFormat(format!("Invalid line: {line}")));
        }

        Ok(lookup_paths)
    }

    /// Initialize a lookup handle from the ld.so.conf configuration found
    /// under `root` (the running system when `None`), followed by the
    /// default library directories.
    ///
    /// # Errors
    /// Will fail if the ld.so.conf configuration can not be read or has an
    /// invalid format.
    pub fn gen_lookup_dirs(root: Option<&Path>) -> Result<LdSoLookup, LdSoError> {
        let conffile = reroot(root, Path::new("/etc/ld.so.conf"))
            .ok_or_else(|| InvalidFormat("Invalid root".to_string()))?;
        let mut lookup_dirs =
            LdSoLookup::parse_ldso_conf_file(root, &conffile, 0)?;
        lookup_dirs.extend(LdSoLookup::default_dirs(root));
        Ok(LdSoLookup { root: root.map(Path::to_path_buf), lookup_dirs })
    }

    /// Like [`LdSoLookup::gen_lookup_dirs`], falling back to the default
    /// library directories when ld.so.conf is unusable.
    #[must_use]
    pub fn with_root(root: Option<&Path>) -> LdSoLookup {
        match LdSoLookup::gen_lookup_dirs(root) {
            Ok(lookup) => lookup,
            Err(err) => {
                match &err {
                    LdSoError::IO(ioerr)
                        if ioerr.kind() == io::ErrorKind::NotFound =>
                    {
                        debug!("No ld.so.conf: {}", err);
                    }
                    _ => warn!(
                        "Failed to read ld.so.conf, using default library directories: {}",
                        err
                    ),
                }
                LdSoLookup {
                    root: root.map(Path::to_path_buf),
                    lookup_dirs: LdSoLookup::default_dirs(root),
                }
            }
        }
    }

    fn default_dirs(root: Option<&Path>) -> Vec<PathBuf> {
        DEFAULT_LIBRARY_DIRS
            .iter()
            .filter_map(|dir| reroot(root, Path::new(dir)))
            .collect()
    }

    /// `DT_RUNPATH` (or, without one, `DT_RPATH`) entries of `image` with
    /// `$ORIGIN` expanded to its directory.
    fn runpath_dirs(&self, image: &ElfImage) -> Vec<PathBuf> {
        let Some(paths) = image
            .dynamic_str(DT_RUNPATH)
            .or_else(|| image.dynamic_str(DT_RPATH))
        else {
            return Vec::new();
        };
        let origin = match image.path().parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let origin = origin.to_string_lossy();
        paths
            .split(':')
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| {
                if entry.contains("$ORIGIN") || entry.contains("${ORIGIN}") {
                    let expanded = entry
                        .replace("${ORIGIN}", &origin)
                        .replace("$ORIGIN", &origin);
                    Some(clean_path(Path::new(&expanded)))
                } else {
                    reroot(self.root.as_deref(), Path::new(entry))
                }
            })
            .collect()
    }

    /// First candidate for `name` that parses as ELF with the class and
    /// machine of `target`.
    fn resolve(
        &self,
        name: &str,
        dirs: &[PathBuf],
        target: &ElfImage,
    ) -> Option<(PathBuf, ElfImage)> {
        let candidates: Vec<PathBuf> = if name.contains('/') {
            reroot(self.root.as_deref(), Path::new(name)).into_iter().collect()
        } else {
            dirs.iter()
                .chain(&self.lookup_dirs)
                .map(|dir| dir.join(name))
                .collect()
        };
        candidates
            .into_iter()
            .filter(|path| path.is_file())
            .find_map(|path| {
                let library = ElfImage::open(&path)
                    .map_err(|err| debug!("Skipping {}: {}", path.display(), err))
                    .ok()?;
                (library.class() == target.class()
                    && library.machine() == target.machine())
                .then_some((path, library))
            })
    }

    /// Walk the dependency graph of `image` breadth-first and return the
    /// first library whose file name contains `libc.`.
    #[must_use]
    pub fn find_libc(&self, image: &ElfImage) -> Option<PathBuf> {
        let dirs = self.runpath_dirs(image);
        let mut queue: VecDeque<(String, Vec<PathBuf>, usize)> = image
            .needed_libraries()
            .into_iter()
            .map(|name| (name, dirs.clone(), 1))
            .collect();
        let mut seen = HashSet::new();

        while let Some((name, dirs, depth)) = queue.pop_front() {
            let Some((path, library)) = self.resolve(&name, &dirs, image)
            else {
                debug!("{}: cannot resolve {}", image.path().display(), name);
                continue;
            };
            if !seen.insert(path.clone()) {
                continue;
            }
            if is_libc(&path) {
                return Some(path);
            }
            if depth >= MAX_DEPENDENCY_DEPTH {
                continue;
            }
            let dirs = self.runpath_dirs(&library);
            queue.extend(
                library
                    .needed_libraries()
                    .into_iter()
                    .map(|name| (name, dirs.clone(), depth + 1)),
            );
        }
        debug!(
            "{}: no libc among dependencies, searched {:?}",
            image.path().display(),
            self.lookup_dirs()
        );
        None
    }
}
