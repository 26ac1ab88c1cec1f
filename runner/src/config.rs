use gdf_kernel::logging::LoggingConfig;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct FabricConfig {
    pub inbound_queue: String,
    pub outbound_queue: String,
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetConfig {
    pub reader_address: String,
    pub writer_address: String,
    pub is_blind: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataframeConfig {
    pub channel_count: usize,
    pub key_space: u64,
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    pub fabric: FabricConfig,
    pub net: NetConfig,
    pub dataframe: DataframeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for RunnerConfig {
    fn default() -> RunnerConfig {
        RunnerConfig {
            fabric: FabricConfig {
                inbound_queue: "atl06_in".to_string(),
                outbound_queue: "atl06_out".to_string(),
                queue_depth: 64,
            },
            net: NetConfig {
                reader_address: "0.0.0.0:7500".to_string(),
                writer_address: "0.0.0.0:7501".to_string(),
                is_blind: false,
            },
            dataframe: DataframeConfig {
                channel_count: 1,
                key_space: 1,
                idle_timeout_secs: 30,
            },
            logging: LoggingConfig::default(),
        }
    }
}

impl RunnerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> RunnerConfig {
        serdeconv::from_toml_file(path).expect("error loading runner configuration file")
    }
}
