pub mod init;
pub mod key;
pub mod sign;
pub mod verify;
pub mod version;

pub use init::Init;
pub use key::Key;
pub use sign::Sign;
pub use verify::Verify;
pub use version::Version;
