mod settings;

pub use settings::{
    AckSettingsConfig, ClusterSettingsConfig, RedisConfig, ServerConfig, Settings,
    WebSocketConfig,
};
