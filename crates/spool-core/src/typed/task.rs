//! Task trait - binds a payload type to its task type name.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A typed task payload.
///
/// # Example
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct SendMail {
///     to: String,
/// }
///
/// impl Task for SendMail {
///     const TYPE: &'static str = "mail.send.v1";
/// }
/// ```
///
/// `Serialize` + `DeserializeOwned` because the payload round-trips through the
/// record file; `'static` so handlers can live behind `Arc`.
pub trait Task: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TYPE: &'static str;
}
