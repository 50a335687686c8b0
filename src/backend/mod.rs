/*!
 * Remote processing service support.
 *
 * - `client`: protocol selection and the job, synchronous and SSE modes
 * - `sse`: incremental Server-Sent-Events parser
 * - `transport`: HTTP seam and its `reqwest` implementation
 * - `deadline`: cancellation token with an absolute expiry
 */

pub mod client;
pub mod deadline;
pub mod sse;
pub mod transport;

pub use client::{BackendClient, BackendProtocol, ProcessMode};
pub use deadline::Deadline;
pub use sse::{parse_sse, SseEvent, SseParser};
pub use transport::{ByteStream, HttpTransport, Transport};
