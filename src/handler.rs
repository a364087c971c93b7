//! Request handler placed in front of the hickory catalog.
//!
//! The catalog drops a query silently when every authority in the chain
//! skips it. For a container name with nothing chained after the container
//! authority that would leave the client waiting for a timeout, so this
//! handler answers SERVFAIL whenever the catalog sent nothing.

use async_trait::async_trait;
use hickory_proto::op::ResponseCode;
use hickory_server::authority::{Catalog, MessageResponse, MessageResponseBuilder};
use hickory_server::proto::rr::Record;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// Serves a catalog and guarantees every query gets an answer.
pub struct ContainerRequestHandler {
    catalog: Catalog,
}

impl ContainerRequestHandler {
    /// Wrap a catalog.
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl RequestHandler for ContainerRequestHandler {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        response_handle: R,
    ) -> ResponseInfo {
        let sent = Arc::new(AtomicBool::new(false));
        let tracked = SentTracker {
            inner: response_handle.clone(),
            sent: sent.clone(),
        };

        let info = self.catalog.handle_request(request, tracked).await;
        if sent.load(Ordering::Acquire) {
            return info;
        }

        debug!(id = request.id(), "no authority answered, returning SERVFAIL");
        let response = MessageResponseBuilder::from_message_request(request)
            .error_msg(request.header(), ResponseCode::ServFail);

        let mut response_handle = response_handle;
        match response_handle.send_response(response).await {
            Ok(info) => info,
            Err(e) => {
                error!("Failed to send SERVFAIL response: {}", e);
                info
            }
        }
    }
}

/// Records whether the catalog wrote a response.
#[derive(Clone)]
struct SentTracker<R> {
    inner: R,
    sent: Arc<AtomicBool>,
}

#[async_trait]
impl<R: ResponseHandler> ResponseHandler for SentTracker<R> {
    async fn send_response<'a>(
        &mut self,
        response: MessageResponse<
            '_,
            'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
        >,
    ) -> io::Result<ResponseInfo> {
        let info = self.inner.send_response(response).await?;
        self.sent.store(true, Ordering::Release);
        Ok(info)
    }
}
