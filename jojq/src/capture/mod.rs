pub mod buffer;
pub mod pipeline;
pub mod record;

pub use buffer::CaptureBuffer;
pub use pipeline::{try_capture, RequestMeta, ResponseMeta, MAX_BODY_BYTES};
pub use record::CaptureRecord;
