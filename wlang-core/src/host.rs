//! Capability boundary to the host platform's native objects.
//!
//! The interpreter only ever sees opaque handles. A bridge decides what a
//! handle means and how members on it behave.

use thiserror::Error;

use crate::value::Value;

/// Host type resolved from a qualified name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeHandle(pub u64);

/// Host-owned value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostValue(pub u64);

/// Receiver of a host member invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostReceiver {
    Value(HostValue),
    /// Static member of a type.
    Type(TypeHandle),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum HostFault {
    /// Uncatchable failure of the bridge itself.
    #[error("{0}")]
    Failed(String),
    /// Exception raised by host code; scripts can catch it by `type_name`.
    #[error("host raised {type_name}")]
    Thrown { type_name: String, value: Value },
}

pub trait HostBridge {
    /// Type names visible without an `import`.
    fn builtin_types(&self) -> Vec<String> {
        Vec::new()
    }

    fn resolve_type(&mut self, qualified_name: &str) -> Option<TypeHandle>;

    /// Runtime type name of a host value.
    fn type_name(&self, value: HostValue) -> String;

    fn construct(&mut self, ty: TypeHandle, args: Vec<Value>) -> Result<Value, HostFault>;

    fn invoke(
        &mut self,
        receiver: HostReceiver,
        member: &str,
        args: Vec<Value>,
    ) -> Result<Value, HostFault>;

    fn get_field(&mut self, value: HostValue, name: &str) -> Result<Value, HostFault>;

    fn set_field(&mut self, value: HostValue, name: &str, new_value: Value)
    -> Result<(), HostFault>;
}

/// Bridge for programs that never touch host types.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHost;

impl NoHost {
    fn unavailable() -> HostFault {
        HostFault::Failed("no host bridge is configured".to_string())
    }
}

impl HostBridge for NoHost {
    fn resolve_type(&mut self, _qualified_name: &str) -> Option<TypeHandle> {
        None
    }

    fn type_name(&self, _value: HostValue) -> String {
        "host".to_string()
    }

    fn construct(&mut self, _ty: TypeHandle, _args: Vec<Value>) -> Result<Value, HostFault> {
        Err(Self::unavailable())
    }

    fn invoke(
        &mut self,
        _receiver: HostReceiver,
        _member: &str,
        _args: Vec<Value>,
    ) -> Result<Value, HostFault> {
        Err(Self::unavailable())
    }

    fn get_field(&mut self, _value: HostValue, _name: &str) -> Result<Value, HostFault> {
        Err(Self::unavailable())
    }

    fn set_field(
        &mut self,
        _value: HostValue,
        _name: &str,
        _new_value: Value,
    ) -> Result<(), HostFault> {
        Err(Self::unavailable())
    }
}
