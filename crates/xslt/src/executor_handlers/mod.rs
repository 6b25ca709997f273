//! One module per family of instructions. Each handler takes the executor,
//! the instruction's operands, the current focus and the output builder.

pub(crate) mod apply_templates;
pub(crate) mod call_template;
pub(crate) mod control_flow;
pub(crate) mod copy;
pub(crate) mod for_each;
pub(crate) mod literals;
pub(crate) mod variables;
