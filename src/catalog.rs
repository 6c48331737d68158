use bytes::Bytes;

/// Index of the canonical happy-path payload.
pub const DEFAULT_PAYLOAD: usize = 9;

/// Builtin payload variants, in catalog order.
const BUILTIN: [(&str, &str); 10] = [
    ("vast_wrapper_xml", r#"{"puts":[{"type":"xml","value":"<VAST version=\\\"3.0\\\"><Ad><Wrapper><AdSystem>prebid.org wrapper</AdSystem><5YnPFbYABozbp1eJG4BYABAYoBA1VTRJIBAQbwUpgBAaABAagBAbABALgBA8ABBMgBAtABANgBAOABAPABAIoCO3VmKCdhJywgMjUyOTg4NSwgMTU3ODMxMzc2NSk7dWYoJ3InLCA5NzUxNzc3MSwgLh4A8PWSArUCIXlqd21vZ2kyLUx3S0VNdUJ3QzRZQUNDYzhWc3dBRGdBUUFSSTdVaFE2ZEduQmxnQVlNSUdhQUJ3S0hnR2dBRThpQUVHa0FFQW1BRUFvQUVCcUFFRHNBRUF1UUh6cldxa0FBQVVRTUVCODYxcXBBQUFGRURKQWZmNTBxUXI0ZW9fMlFFQUFBQUFBQUR3UC1BQkFQVUJBQUFBQUpnQ0FLQUNBTFVDQUFBQUFMMENBQUFBQU9BQ0FPZ0NBUGdDQUlBREFaZ0RBYWdEdHZpOENyb0RDVk5KVGpNNk5EY3pPT0FELVJpSUJBQ1FCQUNZQkFIQkIFRQkBCHlRUQkJAQEUTmdFQVBFEY0BkCw0QkFDSUJZSWxxUVUBEQEUPHdQdy4umgKJASFMZzlaRFE2OQEkblBGYklBUW9BRBVIVFVRRG9KVTBsT016bzBOek00UVBrWVMReAxQQV9VEQwMQUFBVx0MAFkdDABhHQwAYx0M8FJlQUEuwgI_aHR0cDovL3ByZWJpZC5vcmcvZGV2LWRvY3Mvc2hvdy12aWRlby13aXRoLWEtZGZwLXZpZGVvLXRhZy5odG1s2AIA4AKtmEjqAjNodAVKSHRlc3QubG9jYWxob3N0Ojk5OTkFFDgvcGFnZXMvaW5zdHJlYW0FPmjyAhMKD0NVU1RPTV9NT0RFTF9JRBIA8gIaChYyFgAgTEVBRl9OQU1FAR0IHgoaNh0ACEFTVAE-4ElGSUVEEgCAAwCIAwGQAwCYAxegAwGqAwDAA-CoAcgDANgDAOADAOgDAPgDAYAEAJIEDS91dC92Mw398F6YBACiBAsxMC43NS43NC42OagEtCyyBBIIARACGIAFIOADKAEoAjAAOAO4BADABADIBADSBA45MzI1I1NJTjM6NDczONoEAggB4AQA8ATLgcAuiAUBmAUAoAX______wEDFAHABQDJBWnbFPA_0gUJCQkMeAAA2AUB4AUB8AXDlQv6BQQIABAAkAYBmAYAuAYAwQYJJSjwP9AG9S_aBhYKEAkRGQFQEAAYAOAGBPIGAggAgAcBiAcAoAdA%26s%3D68b9d39d60a72307a201e479000a8c7be5508188]]></VASTAdTagURI><Impression><![CDATA[http://sin3-ib.adnxs.com/vast_track/v2?info=aAAAAAMArgAFAQklKBNeAAAAABEx74AO4IBoExklKBNeAAAAACDLgcAuKAAw7Ug47UhA0-hISLuv1AFQ6dGnBljDlQtiAi0taAFwAXgAgAEBiAEBkAGABZgB4AOgAQCoAcuBwC6wAQE.&s=07e6e5f2f03cc92e899c3ddbf4e2988e966caaa2&event_type=1]]></Impression><Creatives></Creatives></Wrapper></Ad></VAST>","ttlseconds":30}]}"#),
    ("json_boolean", r#"{"puts":[{"type":"json","value":true,"ttlseconds":30}]}"#),
    ("plain_text", r#"{"puts":[{"type":"xml","value":"plain text","ttlseconds":30}]}"#),
    ("numeric_string", r#"{"puts":[{"type":"xml","value":"2","ttlseconds":30}]}"#),
    ("truncated_json", r#"{"puts":[{"type":}]}"#),
    ("empty_puts", r#"{"puts":[]}"#),
    ("empty_object", r#"{}"#),
    ("empty_value", r#"{"puts":[{"type":"xml","value":"","ttlseconds":30}]}"#),
    ("duplicate_key", r#"{"puts":[{"type":"xml","value":"<tag>YourXMLcontentgoeshere.</tag>","ttlseconds":3600,"ttlseconds":30}]}"#),
    ("happy_path_xml", r#"{"puts":[{"type":"xml","value":"<tag>YourXMLcontentgoeshere.</tag>","ttlseconds":30}]}"#),
];

/// One immutable request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    name: &'static str,
    body: Bytes,
}

impl RequestSpec {
    pub fn new(name: &'static str, body: impl Into<Bytes>) -> Self {
        RequestSpec {
            name,
            body: body.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Cheap to clone; every call in a round shares the same buffer.
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// Fixed ordered set of request specs, read-only after construction.
#[derive(Debug, Clone)]
pub struct Catalog {
    specs: Vec<RequestSpec>,
}

impl Catalog {
    pub fn builtin() -> Self {
        let specs = BUILTIN
            .iter()
            .map(|&(name, body)| RequestSpec::new(name, Bytes::from_static(body.as_bytes())))
            .collect();
        Catalog::from_specs(specs)
    }

    pub fn from_specs(specs: Vec<RequestSpec>) -> Self {
        Catalog { specs }
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&RequestSpec> {
        self.specs.get(index)
    }

    pub fn specs(&self) -> &[RequestSpec] {
        &self.specs
    }
}

/// How each round picks its bodies from the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Every call uses the same entry.
    Fixed(usize),
    /// Round `k` uses entry `k % len`.
    Rotate,
    /// Every round makes whole passes over the catalog.
    Sweep,
}

impl Default for Selection {
    fn default() -> Self {
        Selection::Fixed(DEFAULT_PAYLOAD)
    }
}

/// Specs and call budget for one round.
#[derive(Debug, Clone)]
pub struct RoundPlan {
    pub specs: Vec<RequestSpec>,
    pub budget: usize,
}

impl Selection {
    /// Plans round number `round` for a catalog and qps. Returns `None` when the
    /// selection points outside the catalog or the catalog is empty.
    pub fn plan(&self, catalog: &Catalog, round: u64, qps: usize) -> Option<RoundPlan> {
        if catalog.is_empty() {
            return None;
        }
        match *self {
            Selection::Fixed(index) => catalog.get(index).map(|spec| RoundPlan {
                specs: vec![spec.clone()],
                budget: qps,
            }),
            Selection::Rotate => {
                let index = usize::try_from(round % catalog.len() as u64).unwrap_or(0);
                catalog.get(index).map(|spec| RoundPlan {
                    specs: vec![spec.clone()],
                    budget: qps,
                })
            }
            Selection::Sweep => Some(RoundPlan {
                specs: catalog.specs().to_vec(),
                budget: passes_for_budget(catalog.len(), qps).saturating_mul(catalog.len()),
            }),
        }
    }
}

/// Whole passes over `len` inputs needed to issue at least `qps` calls.
pub fn passes_for_budget(len: usize, qps: usize) -> usize {
    if len == 0 {
        return 0;
    }
    qps.div_ceil(len)
}
