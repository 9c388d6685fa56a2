pub mod error;
pub mod metric;
pub mod requests;
pub mod responses;


pub use error::{Result, TallyError};
pub use metric::{Metric, MetricKind, MetricUpdate, MetricValue};
pub use requests::{Metadata, MethodName, Request, RequestId, RpcArgs, REAL_IP_METADATA};
pub use responses::{Response, RpcResult, Status};
