//! Service clients for the sync pipeline

pub mod amap;
pub mod covers;
pub mod image_ops;
pub mod notion;

pub use amap::{AmapClient, GeoError, GeoResult};
pub use covers::{AssetError, ContentHost, CoverMaterializer, GithubContentHost};
pub use image_ops::TransformError;
pub use notion::{NotionClient, NotionError, Page, QueryBatch};
