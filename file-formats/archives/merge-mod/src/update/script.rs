//! Function body compilation

use super::UpdateTarget;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Compile function or state bodies into the change set's entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptCompileUpdate {
    /// Assets holding the script sources, compiled in order
    pub scripts: Vec<String>,
}

impl ScriptCompileUpdate {
    pub(crate) fn structural_issues(&self) -> Vec<String> {
        if self.scripts.is_empty() {
            vec!["script_compile: at least one script is required".to_string()]
        } else {
            Vec::new()
        }
    }

    pub(crate) fn apply(&self, target: &mut UpdateTarget<'_>) -> Result<()> {
        let function = target.require_entry()?;
        let compiler = target.services.compiler.as_ref();
        for script in &self.scripts {
            let source = target.assets.as_string(script)?;
            // Each fragment must see the edits of the previous one
            let context = target
                .scripts
                .refresh(compiler, target.package, target.entry_path)?;
            let result = compiler.compile_function(target.package, function, &source, context);
            target.scripts.invalidate();
            result.map_err(|log| target.compile_error(log))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::assets::{AssetRecord, AssetStore};
    use crate::package::{Entry, EntryBinary, EntryIndex, Package};
    use crate::update::test_support::services;
    use crate::update::{ScriptSession, Update};

    fn package() -> Package {
        let mut package = Package::new("SFXGame.pcc");
        let class = package
            .add_entry(Entry::new("SFXWeapon", "Class", None))
            .unwrap();
        package
            .add_entry(Entry::new("GetDamage", "Function", Some(class)))
            .unwrap();
        package
    }

    fn run(package: &mut Package, scripts: &[&str]) -> (Result<u64>, ScriptSession) {
        let mut store = AssetStore::new();
        store.insert(AssetRecord::loaded("GetDamage.uc", b"return 10;".to_vec()));
        store.insert(AssetRecord::loaded("GetDamage2.uc", b"return 20;".to_vec()));
        store.insert(AssetRecord::loaded("Bad.uc", b"#error".to_vec()));
        let services = services();
        let mut session = ScriptSession::new();
        let mut target = UpdateTarget {
            package,
            entry_path: "SFXWeapon.GetDamage",
            assets: &store,
            services: &services,
            scripts: &mut session,
        };
        let update = Update::ScriptCompile(ScriptCompileUpdate {
            scripts: scripts.iter().map(|s| s.to_string()).collect(),
        });
        let mut total = 0;
        let outcome = update.apply(&mut target, &mut |w| total += w);
        (outcome.map(|()| total), session)
    }

    #[test]
    fn test_fragments_compile_in_order() {
        let mut package = package();
        let (result, session) = run(&mut package, &["GetDamage.uc", "GetDamage2.uc"]);

        assert_eq!(result.unwrap(), 30);
        assert_eq!(session.initializations(), 2);
        assert_eq!(
            package.entry(EntryIndex(1)).unwrap().binary,
            EntryBinary::Function {
                bytecode: b"return 20;".to_vec()
            }
        );
    }

    #[test]
    fn test_failure_reports_no_weight() {
        let mut package = package();
        let (result, _) = run(&mut package, &["GetDamage.uc", "Bad.uc"]);
        assert!(matches!(result.unwrap_err(), Error::Compile { .. }));
    }

    #[test]
    fn test_missing_asset() {
        let mut package = package();
        let (result, _) = run(&mut package, &["Nope.uc"]);
        assert!(matches!(result.unwrap_err(), Error::AssetLoad { .. }));
    }
}
