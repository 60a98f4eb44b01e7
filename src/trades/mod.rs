//! Trade discovery: history seams, decoding, cursor-paginated pipeline

pub mod decoder;
pub mod history;
pub mod pipeline;

pub use decoder::{BalanceDeltaDecoder, TradeDecoder};
pub use history::{AccountDeriver, AtaDeriver, RpcHistory, SignatureHistory, TransactionDetail};
pub use pipeline::TradeService;
