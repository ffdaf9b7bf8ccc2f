pub mod codec;
mod page;

pub use page::Page;
