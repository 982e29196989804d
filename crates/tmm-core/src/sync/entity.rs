//! Per-entity bindings between the local record types and the remote API.

use std::future::Future;

use crate::api::{ApiResult, RemoteApi};
use crate::models::{CategoryFields, CategoryRef, RecordFields, ServerRecord, TransactionFields};

/// A record type the coordinator can download and upload.
pub trait SyncEntity: RecordFields {
    fn fetch<A: RemoteApi>(
        api: &A,
        year: i32,
    ) -> impl Future<Output = ApiResult<Vec<ServerRecord<Self>>>> + Send;

    fn create<A: RemoteApi>(
        api: &A,
        fields: &Self,
        year: i32,
    ) -> impl Future<Output = ApiResult<ServerRecord<Self>>> + Send;

    fn update<A: RemoteApi>(
        api: &A,
        id: i64,
        fields: &Self,
        year: i32,
    ) -> impl Future<Output = ApiResult<ServerRecord<Self>>> + Send;

    fn delete<A: RemoteApi>(api: &A, id: i64, year: i32)
        -> impl Future<Output = ApiResult<()>> + Send;

    /// Whether the fields can be sent as they are. Records that are not ready
    /// stay dirty until a later cycle.
    fn ready_for_upload(&self) -> bool {
        true
    }
}

impl SyncEntity for CategoryFields {
    fn fetch<A: RemoteApi>(
        api: &A,
        year: i32,
    ) -> impl Future<Output = ApiResult<Vec<ServerRecord<Self>>>> + Send {
        api.get_categories(year)
    }

    fn create<A: RemoteApi>(
        api: &A,
        fields: &Self,
        year: i32,
    ) -> impl Future<Output = ApiResult<ServerRecord<Self>>> + Send {
        api.create_category(fields, year)
    }

    fn update<A: RemoteApi>(
        api: &A,
        id: i64,
        fields: &Self,
        year: i32,
    ) -> impl Future<Output = ApiResult<ServerRecord<Self>>> + Send {
        api.update_category(id, fields, year)
    }

    fn delete<A: RemoteApi>(
        api: &A,
        id: i64,
        year: i32,
    ) -> impl Future<Output = ApiResult<()>> + Send {
        api.delete_category(id, year)
    }
}

impl SyncEntity for TransactionFields {
    fn fetch<A: RemoteApi>(
        api: &A,
        year: i32,
    ) -> impl Future<Output = ApiResult<Vec<ServerRecord<Self>>>> + Send {
        api.get_transactions(year)
    }

    fn create<A: RemoteApi>(
        api: &A,
        fields: &Self,
        _year: i32,
    ) -> impl Future<Output = ApiResult<ServerRecord<Self>>> + Send {
        api.create_transaction(fields)
    }

    fn update<A: RemoteApi>(
        api: &A,
        id: i64,
        fields: &Self,
        _year: i32,
    ) -> impl Future<Output = ApiResult<ServerRecord<Self>>> + Send {
        api.update_transaction(id, fields)
    }

    fn delete<A: RemoteApi>(
        api: &A,
        id: i64,
        year: i32,
    ) -> impl Future<Output = ApiResult<()>> + Send {
        api.delete_transaction(id, year)
    }

    /// The category must already exist on the server.
    fn ready_for_upload(&self) -> bool {
        matches!(self.category, CategoryRef::Server(_))
    }
}
