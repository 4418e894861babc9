mod inbound;
mod outbound;

pub use inbound::Inbound;
pub use outbound::Outbound;
