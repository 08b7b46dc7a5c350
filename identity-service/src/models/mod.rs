pub mod company;
pub mod credential;
pub mod registration;
pub mod session;

pub use company::Company;
pub use credential::{Credential, CredentialSummary, Role};
pub use registration::{steps, RegistrationSession};
pub use session::Session;
