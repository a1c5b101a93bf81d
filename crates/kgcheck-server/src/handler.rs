//! Routes decoded requests to a store session.

use kgcheck_store::{StoreError, StoreProxy};
use kgcheck_wire::{Request, RequestBody, Response, ResponseBody};
use tracing::instrument;

/// Applies `request` to `store` and builds the matching response.
#[instrument(skip_all, fields(request_id = request.id.0, op = request.body.op_name()))]
pub fn handle<S: StoreProxy>(store: &mut S, request: Request) -> Response {
    let id = request.id;
    match handle_inner(store, request.body) {
        Ok(body) => Response::new(id, body),
        Err(e) => {
            tracing::debug!(error = %e, "request failed");
            Response::error(id, e.kind(), e.message())
        }
    }
}

fn handle_inner<S: StoreProxy>(store: &mut S, body: RequestBody) -> Result<ResponseBody, StoreError> {
    match body {
        RequestBody::CreateCollection {
            name,
            mutable,
            first_node,
        } => {
            store.create_collection(&name, mutable, &first_node)?;
            Ok(ResponseBody::Done)
        }
        RequestBody::AddReplica { collection, node } => {
            store.add_replica(&collection, &node)?;
            Ok(ResponseBody::Done)
        }
        RequestBody::Read { collection, record } => {
            Ok(ResponseBody::Versions(store.read(&collection, &record)?))
        }
        RequestBody::Update {
            collection,
            record,
            payload,
        } => {
            store.update(&collection, &record, payload)?;
            Ok(ResponseBody::Done)
        }
    }
}
