//! Services layer: domain logic behind the HTTP surface.

pub mod auth;
mod database;
pub mod error;
mod notify;
mod onboarding;
mod otp;
mod provider;
mod storage;
pub mod store;
mod token;
mod ttl;

pub use auth::AuthService;
pub use database::Database;
pub use error::ServiceError;
pub use notify::{CodeNotifier, DeliveryService, Destination, MockNotifier};
pub use onboarding::OnboardingService;
pub use otp::OtpEngine;
pub use provider::{
    GoogleVerifier, HttpIdentityProvider, IdentityProvider, MockIdentityProvider,
    MockSocialVerifier, SocialIdentity, SocialTokenVerifier,
};
pub use storage::{HttpObjectStorage, MockObjectStorage, ObjectStorage, PresignedUpload};
pub use store::{CredentialStore, MemoryStore, SessionStore};
pub use token::{
    AccessClaims, AccessTokenVerifier, JwksVerifier, LocalVerifier, RefreshClaims, TokenService,
};
pub use ttl::{MemoryTtlStore, RedisTtlStore, TtlStore};
