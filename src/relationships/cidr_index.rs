//! Containment index over CIDR blocks
//!
//! Blocks are bucketed by (address family, prefix length). A lookup truncates
//! the address once per distinct prefix length of its family and probes the
//! bucket, so the cost per address is bounded by the number of distinct
//! prefix lengths rather than the number of blocks.

use ahash::{HashMap, HashMapExt};
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::collections::BTreeSet;
use std::net::IpAddr;

pub struct CidrIndex<T> {
    v4: HashMap<u8, HashMap<Ipv4Net, Vec<T>>>,
    v6: HashMap<u8, HashMap<Ipv6Net, Vec<T>>>,
    v4_prefixes: BTreeSet<u8>,
    v6_prefixes: BTreeSet<u8>,
    len: usize,
}

impl<T: Clone> CidrIndex<T> {
    pub fn new() -> Self {
        Self {
            v4: HashMap::new(),
            v6: HashMap::new(),
            v4_prefixes: BTreeSet::new(),
            v6_prefixes: BTreeSet::new(),
            len: 0,
        }
    }

    /// Add a block. Host bits are ignored.
    pub fn insert(&mut self, net: IpNet, value: T) {
        match net.trunc() {
            IpNet::V4(net) => {
                self.v4_prefixes.insert(net.prefix_len());
                self.v4
                    .entry(net.prefix_len())
                    .or_default()
                    .entry(net)
                    .or_default()
                    .push(value);
            }
            IpNet::V6(net) => {
                self.v6_prefixes.insert(net.prefix_len());
                self.v6
                    .entry(net.prefix_len())
                    .or_default()
                    .entry(net)
                    .or_default()
                    .push(value);
            }
        }
        self.len += 1;
    }

    /// Values of every block containing `addr`, same address family only
    pub fn containing(&self, addr: IpAddr) -> Vec<T> {
        let mut found = Vec::new();

        match addr {
            IpAddr::V4(addr) => {
                for prefix in &self.v4_prefixes {
                    let Ok(key) = Ipv4Net::new(addr, *prefix) else {
                        continue;
                    };
                    if let Some(values) = self.v4.get(prefix).and_then(|b| b.get(&key.trunc())) {
                        found.extend(values.iter().cloned());
                    }
                }
            }
            IpAddr::V6(addr) => {
                for prefix in &self.v6_prefixes {
                    let Ok(key) = Ipv6Net::new(addr, *prefix) else {
                        continue;
                    };
                    if let Some(values) = self.v6.get(prefix).and_then(|b| b.get(&key.trunc())) {
                        found.extend(values.iter().cloned());
                    }
                }
            }
        }

        found
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T: Clone> Default for CidrIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}
