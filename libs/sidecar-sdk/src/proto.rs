//! Generated wire types and client stub for the lock RPCs of
//! `dapr.proto.runtime.v1.Dapr` (see `proto/dapr/proto/runtime/v1/lock.proto`).

#![allow(clippy::all, clippy::pedantic, clippy::nursery)]

tonic::include_proto!("dapr.proto.runtime.v1");
