mod cert;
mod policy;

pub use cert::{BasicConstraintsInfo, CertInfo, KeyType, KeyUsageInfo, X509_VERSION_3};
pub use policy::{CertTrustValidator, TrustError, TrustPolicy};
