//! Shared test infrastructure for catalog and loopback integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{DNSClass, LowerName, Name, RData, RecordSet, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinDecoder, BinEncoder};
use hickory_server::authority::{
    Authority, AuthorityObject, Catalog, LookupControlFlow, LookupError, LookupOptions,
    LookupRecords, MessageRequest, MessageResponse, UpdateResult, ZoneType,
};
use hickory_server::proto::rr::Record;
use hickory_server::proto::xfer::Protocol;
use hickory_server::server::{Request, RequestHandler, RequestInfo, ResponseHandler, ResponseInfo};

use docker_dns::authority::ContainerAuthority;
use docker_dns::config::DnsConfig;
use docker_dns::error::DnsError;
use docker_dns::handler::ContainerRequestHandler;
use docker_dns::runtime::{ContainerDetails, ContainerRuntime, EventStream, RuntimeEvent};
use docker_dns::table::HostnameTable;

// --- Constants ---

/// Address the fallback authority answers with for every A query.
pub const UPSTREAM_IP: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 53);

// --- TestResponseHandler ---

/// Captures the serialized DNS response for inspection in tests.
#[derive(Clone)]
pub struct TestResponseHandler {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl TestResponseHandler {
    pub fn new() -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::with_capacity(512))),
        }
    }

    /// Parse the captured wire bytes into a `Message` for assertions.
    pub fn into_message(self) -> Message {
        let buf = self.buf.lock().unwrap();
        assert!(!buf.is_empty(), "no response was captured");
        Message::from_vec(&buf).expect("failed to parse captured DNS response")
    }
}

#[async_trait]
impl ResponseHandler for TestResponseHandler {
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
        let mut buf = self.buf.lock().unwrap();
        buf.clear();
        let mut encoder = BinEncoder::new(&mut *buf);
        encoder.set_max_size(u16::MAX);
        let info = response
            .destructive_emit(&mut encoder)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(info)
    }
}

// --- FallbackAuthority ---

/// Stands in for whatever handler follows the container authority in the
/// chain; answers every A query with `UPSTREAM_IP`.
pub struct FallbackAuthority {
    origin: LowerName,
}

impl FallbackAuthority {
    pub fn new() -> Self {
        Self {
            origin: Name::root().into(),
        }
    }
}

#[async_trait]
impl Authority for FallbackAuthority {
    type Lookup = LookupRecords;

    fn zone_type(&self) -> ZoneType {
        ZoneType::Primary
    }

    fn is_axfr_allowed(&self) -> bool {
        false
    }

    fn origin(&self) -> &LowerName {
        &self.origin
    }

    async fn lookup(
        &self,
        name: &LowerName,
        rtype: RecordType,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        if rtype != RecordType::A {
            return LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NoError)));
        }
        let name = Name::from(name.clone());
        let mut record_set = RecordSet::new(name.clone(), RecordType::A, 0);
        let mut record = Record::from_rdata(name, 300, RData::A(A::from(UPSTREAM_IP)));
        record.set_dns_class(DNSClass::IN);
        record_set.insert(record, 0);
        LookupControlFlow::Break(Ok(LookupRecords::new(lookup_options, Arc::new(record_set))))
    }

    async fn search(
        &self,
        request_info: RequestInfo<'_>,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        Authority::lookup(
            self,
            request_info.query.name(),
            request_info.query.query_type(),
            lookup_options,
        )
        .await
    }

    async fn get_nsec_records(
        &self,
        _name: &LowerName,
        _lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NoError)))
    }

    async fn update(&self, _update: &MessageRequest) -> UpdateResult<bool> {
        Err(ResponseCode::NotImp)
    }
}

// --- MockRuntime ---

/// In-memory container runtime with a test-controlled event feed.
#[derive(Default)]
pub struct MockRuntime {
    running: Mutex<Vec<String>>,
    containers: Mutex<HashMap<String, ContainerDetails>>,
    feeds: Mutex<Vec<mpsc::UnboundedReceiver<Result<RuntimeEvent, DnsError>>>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a running container labelled with `hostname`.
    pub fn start_container(&self, id: &str, hostname: &str, ip: &str) {
        let mut labels = HashMap::new();
        labels.insert("hostname".to_string(), hostname.to_string());
        self.containers.lock().unwrap().insert(
            id.to_string(),
            ContainerDetails {
                id: id.to_string(),
                labels,
                ip_address: Some(ip.to_string()),
                ..Default::default()
            },
        );
        self.running.lock().unwrap().push(id.to_string());
    }

    /// Register a running container that carries no hostname label.
    pub fn start_unlabelled(&self, id: &str, ip: &str) {
        self.start_container(id, "", ip);
        if let Some(details) = self.containers.lock().unwrap().get_mut(id) {
            details.labels.clear();
        }
    }

    /// Mark a container stopped; like Docker, its address goes away.
    pub fn stop_container(&self, id: &str) {
        self.running.lock().unwrap().retain(|c| c != id);
        if let Some(details) = self.containers.lock().unwrap().get_mut(id) {
            details.ip_address = None;
        }
    }

    /// Queue an event feed for the next subscription.
    pub fn feed(&self) -> mpsc::UnboundedSender<Result<RuntimeEvent, DnsError>> {
        let (tx, rx) = mpsc::unbounded();
        self.feeds.lock().unwrap().push(rx);
        tx
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn list_running(&self) -> Result<Vec<String>, DnsError> {
        Ok(self.running.lock().unwrap().clone())
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerDetails, DnsError> {
        self.containers
            .lock()
            .unwrap()
            .get(container_id)
            .cloned()
            .ok_or_else(|| DnsError::Runtime(format!("no such container: {container_id}")))
    }

    async fn events(&self) -> Result<EventStream, DnsError> {
        let mut feeds = self.feeds.lock().unwrap();
        if feeds.is_empty() {
            return Err(DnsError::Runtime("event feed unavailable".to_string()));
        }
        Ok(feeds.remove(0).boxed())
    }
}

// --- Config / table builders ---

pub fn test_dns_config() -> DnsConfig {
    DnsConfig {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        ..DnsConfig::default()
    }
}

/// Build a synced table from `(hostname, ip)` pairs.
pub fn synced_table(entries: &[(&str, &str)]) -> HostnameTable {
    let table = HostnameTable::new();
    for (hostname, ip) in entries {
        table.put(hostname, ip.parse().unwrap());
    }
    table.mark_synced();
    table
}

// --- Query/Request construction ---

/// Build wire-format bytes for a DNS query.
pub fn build_query_bytes(name: &str, record_type: RecordType, id: u16) -> Vec<u8> {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    let mut query = Query::new();
    query.set_name(Name::from_ascii(name).unwrap());
    query.set_query_type(record_type);
    query.set_query_class(DNSClass::IN);
    msg.add_query(query);
    msg.to_vec().unwrap()
}

/// Build a full `Request` from a client address.
pub fn build_request(name: &str, record_type: RecordType, id: u16) -> Request {
    let bytes = build_query_bytes(name, record_type, id);
    let mut decoder = BinDecoder::new(&bytes);
    let msg = MessageRequest::read(&mut decoder).expect("failed to parse MessageRequest");
    let src: SocketAddr = "10.0.0.100:12345".parse().unwrap();
    Request::new(msg, src, Protocol::Udp)
}

/// Build a Catalog with the container authority, optionally followed by
/// the fallback authority.
pub fn build_catalog(config: DnsConfig, table: HostnameTable, with_fallback: bool) -> Catalog {
    let authority =
        ContainerAuthority::new(config, table).expect("failed to create ContainerAuthority");
    let origin = Authority::origin(&authority).clone();

    let mut chain: Vec<Arc<dyn AuthorityObject>> = vec![Arc::new(authority)];
    if with_fallback {
        chain.push(Arc::new(FallbackAuthority::new()));
    }

    let mut catalog = Catalog::new();
    catalog.upsert(origin, chain);
    catalog
}

// --- Response helpers ---

/// Build the request handler the standalone server uses over `build_catalog`.
pub fn build_handler(
    config: DnsConfig,
    table: HostnameTable,
    with_fallback: bool,
) -> ContainerRequestHandler {
    ContainerRequestHandler::new(build_catalog(config, table, with_fallback))
}

/// Execute a query through a request handler and return the parsed response.
pub async fn execute_query(
    handler: &impl RequestHandler,
    name: &str,
    record_type: RecordType,
    id: u16,
) -> Message {
    let request = build_request(name, record_type, id);
    let response = TestResponseHandler::new();
    handler.handle_request(&request, response.clone()).await;
    response.into_message()
}

/// Extract A and AAAA addresses from a response, sorted.
pub fn extract_ips(msg: &Message) -> Vec<IpAddr> {
    let mut ips: Vec<IpAddr> = msg
        .answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::A(a) => Some(IpAddr::V4(Ipv4Addr::from(*a))),
            RData::AAAA(aaaa) => Some(IpAddr::V6((*aaaa).into())),
            _ => None,
        })
        .collect();
    ips.sort();
    ips
}

/// Assert response code.
pub fn assert_response_code(msg: &Message, expected: ResponseCode) {
    assert_eq!(
        msg.response_code(),
        expected,
        "expected {:?}, got {:?}",
        expected,
        msg.response_code()
    );
}

/// Assert an authoritative NOERROR response with exactly the expected addresses.
pub fn assert_addresses(msg: &Message, expected: &[&str]) {
    assert_response_code(msg, ResponseCode::NoError);
    assert!(msg.authoritative(), "response is not authoritative");
    let mut expected: Vec<IpAddr> = expected.iter().map(|s| s.parse().unwrap()).collect();
    expected.sort();
    assert_eq!(extract_ips(msg), expected);
}

/// Assert the answer came from the fallback authority.
pub fn assert_delegated(msg: &Message) {
    assert_response_code(msg, ResponseCode::NoError);
    assert_eq!(extract_ips(msg), vec![IpAddr::V4(UPSTREAM_IP)]);
}
