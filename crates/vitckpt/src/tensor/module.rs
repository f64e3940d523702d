//! Module trait and state loading.

use super::{StateDict, Tensor};
use crate::{CheckpointError, Result};
use std::fmt;

/// Keys that did not line up during a state-dict load.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Present in the module but absent from the loaded state
    pub missing_keys: Vec<String>,
    /// Present in the loaded state but unknown to the module
    pub unexpected_keys: Vec<String>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.missing_keys.is_empty() && self.unexpected_keys.is_empty()
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "missing_keys={:?}, unexpected_keys={:?}",
            self.missing_keys, self.unexpected_keys
        )
    }
}

/// Anything that owns a set of named tensors.
///
/// Implementors only expose their tensors by name; `state_dict` and
/// `load_state_dict` are provided on top of that.
pub trait Module {
    /// Names of every tensor (parameters and persistent buffers).
    fn tensor_names(&self) -> Vec<String>;

    fn tensor(&self, name: &str) -> Option<&Tensor>;

    fn tensor_mut(&mut self, name: &str) -> Option<&mut Tensor>;

    /// Snapshot of all named tensors.
    fn state_dict(&self) -> StateDict {
        self.tensor_names()
            .into_iter()
            .filter_map(|name| {
                let tensor = self.tensor(&name)?.clone();
                Some((name, tensor))
            })
            .collect()
    }

    /// Copy tensors from `state` into the module.
    ///
    /// Shapes of shared keys are validated before anything is written, so a
    /// failed load leaves the module untouched. With `strict` set, any
    /// missing or unexpected key is an error as well.
    fn load_state_dict(&mut self, state: &StateDict, strict: bool) -> Result<LoadReport> {
        let names = self.tensor_names();
        let mut report = LoadReport::default();

        for name in &names {
            match (self.tensor(name), state.get(name)) {
                (Some(current), Some(incoming)) => {
                    if current.shape() != incoming.shape() {
                        return Err(CheckpointError::ShapeMismatch {
                            name: name.clone(),
                            expected: current.shape().to_vec(),
                            actual: incoming.shape().to_vec(),
                        });
                    }
                }
                _ => report.missing_keys.push(name.clone()),
            }
        }

        report.unexpected_keys = state
            .keys()
            .filter(|k| self.tensor(k).is_none())
            .cloned()
            .collect();

        if strict && !report.is_clean() {
            return Err(CheckpointError::IncompatibleKeys {
                missing: report.missing_keys,
                unexpected: report.unexpected_keys,
            });
        }

        for name in &names {
            if let (Some(incoming), Some(current)) = (state.get(name), self.tensor_mut(name)) {
                current.assign(incoming);
            }
        }

        Ok(report)
    }
}
