use std::time::{SystemTime, UNIX_EPOCH};

use crate::{callable::Arity, NativeFunction, RuntimeErrorType, Value};

/// The native functions an interpreter defines in its global scope. `Natives::default()` is
/// the standard set; tests can start from `Natives::empty()` and register their own.
#[derive(Debug, Clone)]
pub struct Natives(Vec<NativeFunction>);

impl Natives {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn with(
        mut self,
        name: &str,
        arity: usize,
        fun: impl Fn(&[Value]) -> Result<Value, RuntimeErrorType> + 'static,
    ) -> Self {
        self.0.push(NativeFunction::new(name, Arity(arity), fun));
        self
    }
}

impl Default for Natives {
    fn default() -> Self {
        Self::empty().with("clock", 0, clock)
    }
}

impl IntoIterator for Natives {
    type Item = NativeFunction;
    type IntoIter = std::vec::IntoIter<NativeFunction>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Seconds since the UNIX epoch.
fn clock(_: &[Value]) -> Result<Value, RuntimeErrorType> {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| RuntimeErrorType::Native(format!("clock is before the epoch: {e}")))?;
    Ok(since_epoch.as_secs_f64().into())
}
