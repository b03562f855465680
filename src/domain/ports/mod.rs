mod durable_store_port;
mod image_source_port;

pub use durable_store_port::DurableStorePort;
pub use image_source_port::ImageSourcePort;

#[cfg(test)]
pub use image_source_port::MockImageSourcePort;
