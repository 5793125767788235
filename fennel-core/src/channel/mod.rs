pub mod model;


pub use model::{
    content_hash, Channel, ChannelModel, ChannelStatus, ChannelType, LimitState, NewChannel,
    RecoveryReset, ScoreLimits, UnknownChannelType,
};
