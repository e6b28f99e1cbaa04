pub mod assembler;
pub mod ledger;
pub mod lister;
pub mod result;
pub mod snapshot;
pub mod traversal;

pub use assembler::*;
pub use ledger::*;
pub use lister::*;
pub use result::*;
pub use snapshot::*;
pub use traversal::*;
