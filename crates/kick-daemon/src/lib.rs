pub mod http;
pub mod kick;
pub mod logs;
