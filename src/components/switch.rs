//! Switch component.

use serde_json::Value;

use super::base::{Component, ComponentKind, ValueSlot, Writer};
use crate::error::Result;

/// Command payloads become the new value verbatim.
struct VerbatimWriter;

impl Writer for VerbatimWriter {
    fn write(&mut self, slot: &ValueSlot, payload: &[u8]) -> Result<()> {
        slot.set(Value::String(String::from_utf8_lossy(payload).into_owned()));
        Ok(())
    }
}

/// Build a switch. The value starts as `"ON"`; `payload_on`/`payload_off`
/// can be overridden through [`Component::set_field`].
pub fn switch() -> Component {
    let mut component = Component::new(ComponentKind::Switch);
    component.set_value("ON");
    component.set_writer(VerbatimWriter);
    component
}
