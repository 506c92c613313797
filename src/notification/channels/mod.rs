//! 具体渠道实现

pub mod raw;
pub mod wecom;
pub mod bark;

pub use raw::RawChannel;
pub use wecom::WeComChannel;
pub use bark::BarkChannel;
