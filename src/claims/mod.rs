//! Claims: the fact-check listing backed by a remote API and the local cache.

pub mod api_types;
mod cache;
mod client;
mod repository;
mod types;

pub use api_types::{
  ClaimsResponse, LoginRequest, LoginResponse, PostClaimRequest, PostClaimResponse, VoteResponse,
};
pub use cache::ClaimsQueryKey;
pub use client::ClaimsClient;
pub use repository::ClaimsRepository;
pub use types::{Claim, ClaimRequest};
