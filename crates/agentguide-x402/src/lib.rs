//! x402 payment protocol support for the agentguide resource gateway.
//!
//! Implements HTTP 402 pay-per-request negotiation using EIP-712 signed
//! authorizations over an ERC-20 `transferWithAuthorization`.
//!
//! # Two-party roles
//!
//! - **Seller** — a gateway fronting a paid origin challenges unpaid
//!   requests with a 402 carrying [`PaymentRequirements`], then verifies and
//!   settles presented payments through a [`Facilitator`].
//! - **Buyer** — a gateway fronting a client answers an upstream 402 by
//!   building a signed [`PaymentPayload`] with [`PaymentBuilder`] and
//!   retrying with an `X-Payment` header.

pub mod builder;
pub mod eip712;
pub mod error;
pub mod facilitator;
pub mod network;
pub mod payment;
pub mod response;

use alloy::sol;

// EIP-712 struct for ERC-3009 payment authorizations. The sol! macro derives
// SolStruct, which provides eip712_signing_hash().
sol! {
    #[derive(Debug)]
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
}

pub use builder::PaymentBuilder;
pub use error::X402Error;
pub use facilitator::{Facilitator, FacilitatorRequest, HttpFacilitator};
pub use network::ChainNetwork;
pub use payment::{
    DiscoveryItem, DiscoveryResponse, ExactEvmPayload, PaymentAuthorization, PaymentPayload,
    PaymentRequiredEnvelope, PaymentRequirements,
};
pub use response::{SettleResponse, VerifyResponse};

/// Protocol version spoken by this implementation.
pub const X402_VERSION: u32 = 1;
