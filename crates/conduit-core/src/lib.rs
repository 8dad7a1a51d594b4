#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod document;
mod error;
mod event;
mod invocation;
mod message;
mod provider;
mod tool;

pub use crate::document::DocumentDescriptor;
pub use crate::error::{BoxedError, Error, ErrorKind, Result};
pub use crate::event::{StreamEvent, ToolPhase};
pub use crate::invocation::{FailureKind, InvocationId, ToolInvocation, ToolOutcome, ToolResult};
pub use crate::message::{Message, Role, ToolCallRequest};
pub use crate::provider::{
    ProviderHandle, ProviderId, ProviderKind, ProviderStatus, ResourceDescriptor,
};
pub use crate::tool::{Arguments, ParameterField, ParameterSchema, ParameterType, ToolDescriptor};
