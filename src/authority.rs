//! Hickory DNS authority answering from the container hostname table.
//!
//! Unknown names are skipped so the catalog can consult the next authority
//! registered for the zone.

use async_trait::async_trait;
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::rdata::{A, AAAA, SOA};
use hickory_proto::rr::{DNSClass, LowerName, Name, RData, Record, RecordSet, RecordType};
use hickory_server::authority::{
    Authority, LookupControlFlow, LookupError, LookupOptions, LookupRecords, MessageRequest,
    UpdateResult, ZoneType,
};
use hickory_server::server::RequestInfo;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::config::DnsConfig;
use crate::error::DnsError;
use crate::metrics::{self, QueryResult, Timer};
use crate::resolver::{Answer, QueryResolver};
use crate::table::HostnameTable;

/// Authority serving A/AAAA records for container hostnames.
pub struct ContainerAuthority {
    origin: LowerName,
    resolver: QueryResolver,
    config: Arc<DnsConfig>,
}

impl ContainerAuthority {
    /// Create a new authority for the given configuration and table.
    pub fn new(config: DnsConfig, table: HostnameTable) -> Result<Self, hickory_proto::ProtoError> {
        let mut origin = Name::from_ascii(&config.origin)?;
        origin.set_fqdn(true);

        Ok(Self {
            origin: origin.into(),
            resolver: QueryResolver::new(table),
            config: Arc::new(config),
        })
    }

    /// Resolve a query name, also trying it relative to the origin.
    ///
    /// With origin `docker.internal`, `web.docker.internal` matches a
    /// container labelled `web.docker.internal` or `web`.
    fn answer(&self, lookup_name: &str) -> Answer {
        let answer = self.resolver.answer(lookup_name);
        if answer != Answer::Miss || self.origin.is_root() {
            return answer;
        }

        let origin = self.origin.to_string();
        let origin = origin.trim_end_matches('.');
        match lookup_name
            .strip_suffix(origin)
            .and_then(|prefix| prefix.strip_suffix('.'))
        {
            Some(relative) if !relative.is_empty() => self.resolver.answer(relative),
            _ => Answer::Miss,
        }
    }

    /// Build one address record per address.
    fn build_address_records(
        &self,
        name: Name,
        rtype: RecordType,
        addrs: &[IpAddr],
    ) -> RecordSet {
        let mut record_set = RecordSet::new(name.clone(), rtype, 0);

        for ip in addrs {
            let rdata = match ip {
                IpAddr::V4(v4) => RData::A(A::from(*v4)),
                IpAddr::V6(v6) => RData::AAAA(AAAA::from(*v6)),
            };
            let mut record = Record::from_rdata(name.clone(), self.config.ttl, rdata);
            record.set_dns_class(DNSClass::IN);
            record_set.insert(record, 0);
        }

        record_set
    }

    /// Build the SOA record for this zone.
    fn build_soa_record(&self) -> RecordSet {
        let soa = SOA::new(
            Name::from_ascii(&self.config.soa.mname).unwrap_or_else(|_| Name::root()),
            Name::from_ascii(&self.config.soa.rname).unwrap_or_else(|_| Name::root()),
            self.resolver.table().serial(),
            soa_interval(self.config.soa.refresh),
            soa_interval(self.config.soa.retry),
            soa_interval(self.config.soa.expire),
            self.config.soa.minimum,
        );

        let name = Name::from(self.origin.clone());
        let mut record_set = RecordSet::new(name.clone(), RecordType::SOA, 0);
        let mut record = Record::from_rdata(name, self.config.ttl, RData::SOA(soa));
        record.set_dns_class(DNSClass::IN);
        record_set.insert(record, 0);

        record_set
    }

    fn no_data() -> LookupControlFlow<LookupRecords> {
        LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NoError)))
    }
}

/// SOA timers are signed on the wire in hickory; larger values saturate.
fn soa_interval(secs: u32) -> i32 {
    i32::try_from(secs).unwrap_or(i32::MAX)
}

#[async_trait]
impl Authority for ContainerAuthority {
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
        let timer = Timer::start();
        let rtype_str = format!("{:?}", rtype);

        if !self.resolver.table().is_synced() {
            debug!("Hostname table not synced, failing lookup");
            metrics::record_query(&rtype_str, QueryResult::NotReady, timer.elapsed());
            return LookupControlFlow::Break(Err(LookupError::from(io::Error::new(
                io::ErrorKind::NotConnected,
                DnsError::NotReady.to_string(),
            ))));
        }

        // The apex only carries the SOA used for negative answers
        if *name == self.origin {
            if rtype != RecordType::SOA {
                metrics::record_query(&rtype_str, QueryResult::NoData, timer.elapsed());
                return Self::no_data();
            }
            debug!(name = %name, "SOA lookup");
            metrics::record_query(&rtype_str, QueryResult::Success, timer.elapsed());
            let record_set = Arc::new(self.build_soa_record());
            return LookupControlFlow::Break(Ok(LookupRecords::new(lookup_options, record_set)));
        }

        let name_str = name.to_string();
        let lookup_name = name_str.trim_end_matches('.');

        trace!(name = %lookup_name, rtype = ?rtype, "DNS lookup");

        let answer = self.answer(lookup_name);
        if answer == Answer::Miss {
            debug!(name = %lookup_name, "no container hostname, delegating");
            metrics::record_query(&rtype_str, QueryResult::Delegated, timer.elapsed());
            return LookupControlFlow::Skip;
        }

        let addrs: Vec<IpAddr> = match rtype {
            RecordType::A => answer.ipv4().collect(),
            RecordType::AAAA => answer.ipv6().collect(),
            _ => Vec::new(),
        };

        if addrs.is_empty() {
            debug!(name = %lookup_name, rtype = ?rtype, "no records of requested type");
            metrics::record_query(&rtype_str, QueryResult::NoData, timer.elapsed());
            return Self::no_data();
        }

        debug!(name = %lookup_name, count = addrs.len(), "returning container addresses");
        metrics::record_addresses_returned(addrs.len());
        metrics::record_query(&rtype_str, QueryResult::Success, timer.elapsed());
        let record_set = Arc::new(self.build_address_records(Name::from(name.clone()), rtype, &addrs));
        LookupControlFlow::Break(Ok(LookupRecords::new(lookup_options, record_set)))
    }

    async fn search(
        &self,
        request_info: RequestInfo<'_>,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        self.lookup(
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
        // DNSSEC not supported
        Self::no_data()
    }

    async fn update(&self, _update: &MessageRequest) -> UpdateResult<bool> {
        // Dynamic updates not supported
        Err(ResponseCode::NotImp)
    }
}
