/*!
    Client-side license processing and cryptographic unlocking pipeline for
    an EPUB-style content-protection scheme: parses and verifies a signed
    license, chains its provider certificate to a trust anchor, derives a
    user key from a passphrase to unwrap the content key, and exposes a
    random-access AES-CBC decryption stream over a container's encrypted
    resources.

    See the component table in the design notes for how the modules here
    map onto the pipeline: [`cert`] and [`crl`] establish trust,
    [`profile`] binds algorithms and the root anchor to a license's
    `encryption.profile`, [`license`] parses and verifies the document,
    [`key`] derives and checks the user key and unwraps the content key,
    [`rights`] exposes and consumes countable rights, [`decrypt`] adapts
    random-access reads over encrypted resources, [`acquisition`] drives
    publication downloads, and [`service`] orchestrates all of the above
    behind opaque handles.
*/

pub mod acquisition;
pub mod cert;
pub mod crl;
pub mod crypto;
pub mod decrypt;
pub mod error;
pub mod key;
pub mod license;
pub mod profile;
pub mod rights;
pub mod service;

pub use self::cert::Certificate;
pub use self::crl::{CrlCache, CrlFetcher};
pub use self::crypto::SignatureAlgorithm;
pub use self::decrypt::{ArchiveResource, DecryptionStream};
pub use self::error::LcpError;
pub use self::key::{ContentKey, KeyProvider, UserKey};
pub use self::license::License;
pub use self::profile::{Profile, ProfileRegistry};
pub use self::rights::{InMemoryRightsStorage, RightValue, RightsManager, RightsStorage};
pub use self::service::{LcpService, LicenseHandle};
