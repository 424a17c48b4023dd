// # Address Store Implementations
//
// Implementations of the AddrStore trait for different persistence
// strategies.

pub mod file;
pub mod memory;

pub use file::FileAddrStore;
pub use memory::MemoryAddrStore;
