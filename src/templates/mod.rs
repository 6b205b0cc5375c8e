pub mod install_worker_template;

pub use install_worker_template::InstallWorkerTemplate;
