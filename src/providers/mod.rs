pub mod http_errors;
pub mod openai;
pub mod sse;
