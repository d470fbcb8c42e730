pub mod directory;
pub mod scanner;
pub mod selector;

pub use directory::{PeerDirectory, PeerTable};
pub use scanner::{SecretKind, SecretScanner};
pub use selector::{maintenance_loop, ForcedPeer, PeerSelector};
