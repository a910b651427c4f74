//! LNURL wire formats: bech32 codec, protocol payloads, voucher links and
//! lightning-address resolution.

pub mod address;
pub mod codec;
pub mod bolt11;
pub mod links;
pub mod protocol;

pub use address::{
    is_valid_lightning_address, HttpPayEndpointResolver, LightningAddress, PayEndpoint,
    PayEndpointResolver, ResolveError,
};
pub use codec::{decode_lnurl, encode_lnurl, Bech32Error};
pub use links::{LinkKind, Links};
pub use protocol::{LnurlStatus, PayCallbackResponse, PayRequest, WithdrawRequest};
