//! Generated gRPC bindings for the worker transport (spec.md §6).

pub mod hodei_worker_v1 {
    tonic::include_proto!("hodei.worker.v1");
}

pub use hodei_worker_v1::*;
