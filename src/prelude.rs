pub use std::{collections::HashMap, sync::Arc, time::Duration};

pub use async_trait::async_trait;
pub use chrono::{NaiveDateTime as DateTime, Utc};
pub use tokio::sync::watch;
pub use tracing::{debug, error, info, warn};

pub use crate::error::{Error, Result};
pub(crate) use crate::utils;
