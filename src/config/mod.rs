mod settings;

pub use settings::{
    DatabaseConfig, DeliveryConfig, MailConfig, MetricsConfig, OtelConfig, PurgeConfig, Settings,
    StoreConfig, TemplatesConfig,
};
