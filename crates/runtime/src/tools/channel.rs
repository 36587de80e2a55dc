//! Session channel trait.

use crate::Result;
use crate::catalog::RawToolRecord;
use crate::tools::Payload;
use serde_json::{Map, Value};
use std::future::Future;

/// An ordered request/response connection to a tool host.
///
/// Implementations may assume calls on one channel never overlap; the
/// session issues them one at a time.
pub trait Channel: Send + Sync {
    /// Fetch the raw tool catalog, in host order.
    fn list_tools(&self) -> impl Future<Output = Result<Vec<RawToolRecord>>> + Send;

    /// Invoke a tool by name.
    fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> impl Future<Output = Result<Payload>> + Send;

    /// Release the host (stop the process, close pipes).
    fn close(self) -> impl Future<Output = ()> + Send
    where
        Self: Sized;
}
