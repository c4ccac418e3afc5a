pub mod channel;
pub mod config;
pub mod cron;
pub mod ids;
pub mod pool;
pub mod registry;
pub mod router;
pub mod server;
pub mod static_files;

pub use channel::Channel;
pub use config::Config;
pub use cron::{CronError, CronSchedule, CronScheduler};
pub use pool::{task_panic, TaskPool};
pub use registry::{HandlerModule, HandlerTable, ModuleLoader, ModuleRegistry, StaticModuleLoader};
pub use router::{PathParams, RequestHandler, Router};
pub use server::{
    ErrorCallback, HttpRequest, HttpResponse, ServerError, ServerHandle, UploadedFile, WebServer,
};
