//! Effect Model Nodes
//!
//! Transfer functions for the leaf statement nodes: variable assignment,
//! echo, toolchain installation, artifact upload/download, releases, base64
//! transcoding and the build/checkout markers. Each produces one after-state
//! per exit kind; writes never erase previously stored values.

use std::collections::BTreeMap;

use base64::Engine;

use crate::dataflow::eval::{Evaluator, StatementSet, WriteStatement};
use crate::dataflow::facts::{Location, LocationSpecifier, Scopes, Value};
use crate::dataflow::graph::{ExitKind, NodeKind};
use crate::dataflow::state::{transfer_state, DebugLabel, State, StateTransferFilter};

/// Apply the transfer function of a leaf node.
pub fn apply_effects(
    kind: &NodeKind,
    before: &State,
    scopes: &Scopes,
    seq: &mut u64,
) -> BTreeMap<ExitKind, State> {
    match kind {
        NodeKind::NoOp | NodeKind::GitCheckout => passthrough(before, seq),

        NodeKind::BashExitStmt => {
            let mut state = State::new();
            transfer_state(before, &mut state, &StateTransferFilter::All, seq, true);
            BTreeMap::from([(ExitKind::BashExit, state)])
        }

        NodeKind::VarAssign {
            scope, name, value, ..
        } => {
            let write = WriteStatement::new(
                Location::new(*scope, LocationSpecifier::Variable(Box::new(name.clone()))),
                value.clone(),
            );
            default_exit(StatementSet::new(vec![write]).apply_effects(before, scopes, seq))
        }

        NodeKind::BashEcho { target, value } => {
            let write = WriteStatement::new(target.clone(), value.clone());
            default_exit(StatementSet::new(vec![write]).apply_effects(before, scopes, seq))
        }

        NodeKind::MavenBuild {
            filesystem,
            data_id,
        } => {
            // The build drops opaque new outputs under the target directory.
            let write = WriteStatement::new(
                Location::new(
                    *filesystem,
                    LocationSpecifier::FilesystemAnyUnderDir(Box::new(Value::lit("target"))),
                ),
                Value::ArbitraryNewData(*data_id),
            );
            default_exit(StatementSet::new(vec![write]).apply_effects(before, scopes, seq))
        }

        NodeKind::Base64Encode { input, output } => {
            let evaluator = Evaluator::new(before, scopes);
            let mut after = State::new();
            for (resolved, _) in evaluator.transform_value(&Value::read(input.clone())) {
                let encoded = match resolved {
                    Value::StringLiteral(text) => {
                        let mut encoded =
                            base64::engine::general_purpose::STANDARD.encode(text.as_bytes());
                        encoded.push('\n');
                        Value::StringLiteral(encoded)
                    }
                    // The encoder is inexact for non-literal inputs.
                    other => Value::Symbolic(Box::new(other)),
                };
                *seq += 1;
                after.insert(
                    output.clone(),
                    encoded,
                    DebugLabel {
                        seq: *seq,
                        is_copy: false,
                    },
                );
            }
            transfer_state(before, &mut after, &StateTransferFilter::All, seq, true);
            BTreeMap::from([(ExitKind::Default, after)])
        }

        NodeKind::Base64Decode { input, output } => {
            let write = WriteStatement::new(
                output.clone(),
                Value::base64_decode(Value::read(input.clone())),
            );
            default_exit(StatementSet::new(vec![write]).apply_effects(before, scopes, seq))
        }

        NodeKind::InstallPackage {
            scope,
            name,
            version,
            distribution,
            url,
        } => {
            let write = WriteStatement::new(
                Location::new(
                    *scope,
                    LocationSpecifier::Installed(Box::new(name.clone())),
                ),
                Value::InstalledPackage {
                    name: Box::new(name.clone()),
                    version: Box::new(version.clone()),
                    distribution: Box::new(distribution.clone()),
                    url: Box::new(url.clone()),
                },
            );
            default_exit(StatementSet::new(vec![write]).apply_effects(before, scopes, seq))
        }

        NodeKind::UploadArtifact {
            artifacts,
            name,
            file,
            filesystem,
            path,
        } => {
            let write = WriteStatement::new(
                Location::new(
                    *artifacts,
                    LocationSpecifier::Artifact {
                        name: Box::new(name.clone()),
                        file: Box::new(file.clone()),
                    },
                ),
                Value::read(Location::new(
                    *filesystem,
                    LocationSpecifier::Filesystem(Box::new(path.clone())),
                )),
            );
            default_exit(StatementSet::new(vec![write]).apply_effects(before, scopes, seq))
        }

        NodeKind::DownloadArtifact {
            artifacts,
            name,
            filesystem,
        } => {
            // Each file of the artifact reappears on the filesystem under its
            // own name, holding that file's stored contents. The shared read
            // over the artifact's filenames links path and contents.
            let any_file = Value::read(Location::new(
                *artifacts,
                LocationSpecifier::ArtifactAnyFilename(Box::new(name.clone())),
            ));
            let write = WriteStatement::new(
                Location::new(
                    *filesystem,
                    LocationSpecifier::Filesystem(Box::new(any_file.clone())),
                ),
                Value::read(Location::new(
                    *artifacts,
                    LocationSpecifier::Artifact {
                        name: Box::new(name.clone()),
                        file: Box::new(any_file),
                    },
                )),
            );
            default_exit(StatementSet::new(vec![write]).apply_effects(before, scopes, seq))
        }

        NodeKind::Release {
            releases,
            name,
            file,
            filesystem,
            path,
        } => {
            let write = WriteStatement::new(
                Location::new(
                    *releases,
                    LocationSpecifier::Artifact {
                        name: Box::new(name.clone()),
                        file: Box::new(file.clone()),
                    },
                ),
                Value::read(Location::new(
                    *filesystem,
                    LocationSpecifier::Filesystem(Box::new(path.clone())),
                )),
            );
            default_exit(StatementSet::new(vec![write]).apply_effects(before, scopes, seq))
        }

        // Non-leaf kinds have no transfer function.
        _ => passthrough(before, seq),
    }
}

fn passthrough(before: &State, seq: &mut u64) -> BTreeMap<ExitKind, State> {
    let mut state = State::new();
    transfer_state(before, &mut state, &StateTransferFilter::All, seq, true);
    BTreeMap::from([(ExitKind::Default, state)])
}

fn default_exit(state: State) -> BTreeMap<ExitKind, State> {
    BTreeMap::from([(ExitKind::Default, state)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataflow::graph::VarAssignKind;

    #[test]
    fn test_var_assign_writes_variable() {
        let mut scopes = Scopes::new();
        let env = scopes.alloc("env", None);
        let mut seq = 0;
        let kind = NodeKind::VarAssign {
            kind: VarAssignKind::BashEnvVar,
            scope: env,
            name: Value::lit("VERSION"),
            value: Value::lit("1.2.3"),
        };
        let afters = apply_effects(&kind, &State::new(), &scopes, &mut seq);
        let after = &afters[&ExitKind::Default];
        assert!(after.contains(
            &Location::new(env, LocationSpecifier::var_named("VERSION")),
            &Value::lit("1.2.3")
        ));
    }

    #[test]
    fn test_bash_exit_produces_bash_exit_state() {
        let mut scopes = Scopes::new();
        let env = scopes.alloc("env", None);
        let mut state = State::new();
        state.insert(
            Location::new(env, LocationSpecifier::var_named("X")),
            Value::lit("1"),
            DebugLabel { seq: 1, is_copy: false },
        );
        let mut seq = 10;
        let afters = apply_effects(&NodeKind::BashExitStmt, &state, &scopes, &mut seq);
        assert!(afters.contains_key(&ExitKind::BashExit));
        assert!(!afters.contains_key(&ExitKind::Default));
        assert_eq!(afters[&ExitKind::BashExit].len(), 1);
    }

    #[test]
    fn test_upload_then_download_roundtrip_through_bindings() {
        let mut scopes = Scopes::new();
        let artifacts = scopes.alloc("artifacts", None);
        let fs_a = scopes.alloc("filesystem", None);
        let fs_b = scopes.alloc("filesystem", None);
        let mut seq = 0;

        // Seed the uploading job's filesystem.
        let mut state = State::new();
        state.insert(
            Location::new(fs_a, LocationSpecifier::filesystem(Value::lit("target/app.jar"))),
            Value::ArbitraryNewData(42),
            DebugLabel { seq: 0, is_copy: false },
        );

        let upload = NodeKind::UploadArtifact {
            artifacts,
            name: Value::lit("jars"),
            file: Value::lit("app.jar"),
            filesystem: fs_a,
            path: Value::lit("target/app.jar"),
        };
        let state = apply_effects(&upload, &state, &scopes, &mut seq)
            .remove(&ExitKind::Default)
            .unwrap();
        assert!(state.contains(
            &Location::new(
                artifacts,
                LocationSpecifier::Artifact {
                    name: Box::new(Value::lit("jars")),
                    file: Box::new(Value::lit("app.jar")),
                }
            ),
            &Value::ArbitraryNewData(42)
        ));

        let download = NodeKind::DownloadArtifact {
            artifacts,
            name: Value::lit("jars"),
            filesystem: fs_b,
        };
        let state = apply_effects(&download, &state, &scopes, &mut seq)
            .remove(&ExitKind::Default)
            .unwrap();
        // The downloading job sees the file under its artifact filename,
        // holding the uploaded contents.
        assert!(state.contains(
            &Location::new(fs_b, LocationSpecifier::filesystem(Value::lit("app.jar"))),
            &Value::ArbitraryNewData(42)
        ));
    }

    #[test]
    fn test_base64_encode_literal_input() {
        let mut scopes = Scopes::new();
        let pipe = scopes.alloc("pipe", None);
        let console = scopes.alloc("console", None);
        let input = Location::new(pipe, LocationSpecifier::Console);
        let output = Location::new(console, LocationSpecifier::Console);

        let mut state = State::new();
        state.insert(
            input.clone(),
            Value::lit("hello"),
            DebugLabel { seq: 0, is_copy: false },
        );
        let mut seq = 0;
        let afters = apply_effects(
            &NodeKind::Base64Encode { input, output: output.clone() },
            &state,
            &scopes,
            &mut seq,
        );
        let after = &afters[&ExitKind::Default];
        assert!(after.contains(&output, &Value::lit("aGVsbG8=\n")));
    }
}
