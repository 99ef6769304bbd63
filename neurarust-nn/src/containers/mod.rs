pub mod concat;
pub mod sequential;

pub use concat::Concat;
pub use sequential::Sequential;
