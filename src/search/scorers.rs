//! Process-wide scorer registry.
//!
//! Scorers are constructed by name through registered factories. Built-ins
//! are installed by [`init`] during engine bootstrap; hosts add their own
//! through [`register`] at any time, and [`load_all`] pulls in plugin
//! libraries from a directory. Registration order is irrelevant: the table
//! rejects redefinition instead of resolving it by load order.

use std::path::Path;
use std::sync::Once;

use ahash::AHashMap;
use libloading::Library;
use log::{debug, warn};
use parking_lot::{Mutex, RwLock};

use crate::error::{Result, SagittaError};
use crate::search::bm25::BM25;
use crate::search::sort::Scorer;
use crate::search::tfidf::TfIdf;

/// Constructs a scorer from its argument string.
pub type ScorerFactory = fn(args: &str) -> Result<Box<dyn Scorer>>;

/// Symbol a plugin library must export; invoked once after loading so the
/// plugin can call [`register`] for its scorers.
pub const PLUGIN_ENTRY_POINT: &[u8] = b"sagitta_register_scorers";

static REGISTRY: RwLock<Option<AHashMap<String, ScorerFactory>>> = RwLock::new(None);
static LOADED: Mutex<Vec<Library>> = Mutex::new(Vec::new());
static INIT: Once = Once::new();

/// Register the built-in scorers (`bm25`, `tfidf`). Idempotent.
pub fn init() {
    INIT.call_once(|| {
        let ok = register(BM25::NAME, |args| Ok(Box::new(BM25::from_args(args)?)))
            .and_then(|()| register(TfIdf::NAME, |args| Ok(Box::new(TfIdf::from_args(args)?))));
        if let Err(err) = ok {
            warn!("scorer bootstrap skipped a registration: {err}");
        }
    });
}

/// Register a named scorer factory.
///
/// Fails with `AlreadyPresent` if the name is taken; an existing
/// registration is never silently replaced.
pub fn register(name: &str, factory: ScorerFactory) -> Result<()> {
    let mut registry = REGISTRY.write();
    let map = registry.get_or_insert_with(AHashMap::new);
    if map.contains_key(name) {
        return Err(SagittaError::already_present(format!("scorer '{name}'")));
    }
    debug!("registered scorer '{name}'");
    map.insert(name.to_string(), factory);
    Ok(())
}

/// Construct a fresh scorer by name.
pub fn get(name: &str, args: &str) -> Result<Box<dyn Scorer>> {
    init();
    let factory = {
        let registry = REGISTRY.read();
        registry
            .as_ref()
            .and_then(|map| map.get(name))
            .copied()
            .ok_or_else(|| SagittaError::unknown_scorer(name))?
    };
    // The factory runs outside the registry lock.
    factory(args)
}

/// Visit every registered scorer name; the visitor returns `false` to stop.
/// The overall result is `false` iff it did.
pub fn visit(mut visitor: impl FnMut(&str) -> bool) -> bool {
    init();
    let registry = REGISTRY.read();
    if let Some(map) = registry.as_ref() {
        for name in map.keys() {
            if !visitor(name) {
                return false;
            }
        }
    }
    true
}

/// Load every plugin library in `path` and let it self-register.
///
/// Files without a loadable library format or without the
/// [`PLUGIN_ENTRY_POINT`] symbol are skipped with a warning; the loaded
/// libraries stay resident for the rest of the process.
pub fn load_all<P: AsRef<Path>>(path: P) -> Result<()> {
    init();
    for entry in std::fs::read_dir(path.as_ref())? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("so" | "dylib" | "dll") => {}
            _ => continue,
        }

        // SAFETY: loading a plugin runs its initialization code; plugins
        // are trusted host-provided modules by contract.
        let library = match unsafe { Library::new(&path) } {
            Ok(library) => library,
            Err(err) => {
                warn!("skipping plugin {}: {err}", path.display());
                continue;
            }
        };
        // Copy the entry point out so the symbol's borrow of the library
        // ends before the library moves into the resident list.
        let entry_point =
            unsafe { library.get::<unsafe extern "C" fn()>(PLUGIN_ENTRY_POINT) }
                .map(|symbol| *symbol);
        match entry_point {
            Ok(register_scorers) => {
                unsafe { register_scorers() };
                debug!("loaded scorer plugin {}", path.display());
                LOADED.lock().push(library);
            }
            Err(err) => {
                warn!(
                    "plugin {} exports no registration entry point: {err}",
                    path.display()
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_builtin_scorers() {
        let bm25 = get("bm25", "").unwrap();
        assert_eq!(bm25.bucket_size(), 4);

        let with_args = get("bm25", "1.6,0.4").unwrap();
        assert_eq!(with_args.bucket_size(), 4);

        let tfidf = get("tfidf", "true").unwrap();
        assert_eq!(tfidf.bucket_size(), 4);
    }

    #[test]
    fn test_unknown_scorer() {
        let err = match get("no-such-scorer", "") {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        assert!(matches!(err, SagittaError::UnknownScorer(_)));
    }

    #[test]
    fn test_malformed_args_surface() {
        let err = match get("bm25", "one,two") {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        assert!(matches!(err, SagittaError::MalformedArgs(_)));
    }

    #[test]
    fn test_double_registration_fails() {
        init();
        let err = register("bm25", |_| Ok(Box::new(BM25::default()))).unwrap_err();
        assert!(matches!(err, SagittaError::AlreadyPresent(_)));
        // The original factory still answers.
        assert!(get("bm25", "").is_ok());
    }

    #[test]
    fn test_visit_sees_builtins_and_stops_early() {
        init();
        let mut names = Vec::new();
        assert!(visit(|name| {
            names.push(name.to_string());
            true
        }));
        assert!(names.iter().any(|n| n == "bm25"));
        assert!(names.iter().any(|n| n == "tfidf"));

        let mut count = 0;
        assert!(!visit(|_| {
            count += 1;
            false
        }));
        assert_eq!(count, 1);
    }

    #[test]
    fn test_load_all_empty_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        load_all(dir.path()).unwrap();

        // A stray non-library file is ignored.
        std::fs::write(dir.path().join("notes.txt"), b"not a plugin").unwrap();
        load_all(dir.path()).unwrap();
    }

    #[test]
    fn test_load_all_missing_directory() {
        assert!(load_all("/definitely/not/a/real/dir").is_err());
    }
}
