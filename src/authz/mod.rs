//! `AuthorizationProxy`: resolves a caller's claimed identity into an
//! authorized reporting domain. See spec §4.10 and `original_source/cc/core/
//! interface/authorization_proxy_interface.h`.

pub mod proxy;

pub use proxy::{
    AuthorizationError, AuthorizationMetadata, AuthorizationProxy, AuthorizedMetadata,
    CachingAuthorizationProxy, IdentityClient, PassThroughAuthorizationProxy,
};
