//! Provider adapters.
//!
//! One [`ImClient`](crate::client::ImClient) implementation per platform:
//! - [`wecom::WeComClient`]: WeCom `cgi-bin` API, all message types
//! - [`dingtalk::DingTalkClient`]: DingTalk `oapi` API, text and image
//! - [`feishu::FeishuClient`]: Feishu `open-apis` API, text and image
//!
//! The adapters share no encoding logic. Each owns its own token cache,
//! message encoder and directory normalizer. The [`registry::ClientRegistry`]
//! builds the configured adapters from [`Config`](crate::config::Config).

pub mod dingtalk;
pub mod feishu;
pub mod registry;
pub mod wecom;

pub use dingtalk::DingTalkClient;
pub use feishu::FeishuClient;
pub use registry::{ClientRegistry, RegistryError};
pub use wecom::WeComClient;
