//! A thin, line-oriented parser for the `/etc/resolv.conf`-style directives
//! `spec.md` §6 lists, plus the `RES_*`/`ADNS_*` environment variables.
//!
//! This is intentionally not a general resolv.conf library: it knows exactly
//! the directives this engine needs and produces a `ResolverConfig`, nothing
//! more. Grounded on `original_source/src/setup.c`'s `readconfig`/`ccf_*`
//! family for the directive set, defaults, and the "options applied twice"
//! precedence rule.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::Path;

use crate::query::MAX_SERVERS;

/// The well-known DNS port, used whenever a `nameserver` directive names a
/// bare address.
pub const DEFAULT_DNS_PORT: u16 = 53;

/// Bound on the sortlist (`MAXSORTLIST` in the original).
pub const MAX_SORTLIST: usize = 15;
const DEFAULT_RESOLV_CONF: &str = "/etc/resolv.conf";
const MAX_INCLUDE_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortEntry {
	pub base: Ipv4Addr,
	pub mask: Ipv4Addr,
}

impl SortEntry {
	/// Invariant 6: every sortlist entry satisfies `base & ~mask == 0`.
	pub fn is_well_formed(&self) -> bool {
		u32::from(self.base) & !u32::from(self.mask) == 0
	}
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
	/// configured nameservers, each with an explicit port — `DEFAULT_DNS_PORT`
	/// unless a `nameserver` directive names one explicitly (`addr:port`, an
	/// extension past stock resolv.conf that lets a test stand up a
	/// loopback nameserver on an arbitrary port).
	pub servers: Vec<SocketAddrV4>,
	pub sortlist: Vec<SortEntry>,
	pub search: Vec<String>,
	pub ndots: u32,
	pub debug: bool,
	pub no_env: bool,
	/// the first configuration error encountered, if any precluded operation
	pub configerrno: Option<String>,
	/// user-visible `adns:`-prefixed diagnostic lines, buffered for a caller
	/// that hasn't installed a `log` subscriber
	pub diagnostics: Vec<String>,
}

impl Default for ResolverConfig {
	fn default() -> Self {
		Self { servers: Vec::new(), sortlist: Vec::new(), search: Vec::new(), ndots: 1, debug: false, no_env: false, configerrno: None, diagnostics: Vec::new() }
	}
}

impl ResolverConfig {
	fn diag(&mut self, fn_: &str, lno: Option<usize>, msg: impl std::fmt::Display) {
		let line = match lno {
			Some(lno) => format!("adns: {fn_}:{lno}: {msg}"),
			None => format!("adns: {fn_}: {msg}"),
		};

		log::warn!("{line}");
		self.diagnostics.push(line);
	}

	fn save_err(&mut self, msg: impl Into<String>) {
		if self.configerrno.is_none() {
			self.configerrno = Some(msg.into());
		}
	}

	fn add_server(&mut self, addr: SocketAddrV4, fn_: &str, lno: usize) {
		if self.servers.contains(&addr) {
			self.diag(fn_, Some(lno), format!("duplicate nameserver {addr} ignored"));
			return;
		}

		if self.servers.len() >= MAX_SERVERS {
			self.diag(fn_, Some(lno), format!("too many nameservers, ignoring {addr}"));
			return;
		}

		self.servers.push(addr);
	}

	fn add_sortlist_entry(&mut self, spec: &str, fn_: &str, lno: usize) {
		let (addr_part, mask_part) = spec.split_once('/').map_or((spec, None), |(a, m)| (a, Some(m)));

		let Ok(base) = addr_part.parse::<Ipv4Addr>() else {
			self.diag(fn_, Some(lno), format!("invalid sortlist address `{spec}'"));
			return;
		};

		let mask = match mask_part {
			None => legacy_class_mask(base),
			Some(m) if m.contains('.') => match m.parse::<Ipv4Addr>() {
				Ok(mask) => mask,
				Err(_) => {
					self.diag(fn_, Some(lno), format!("invalid sortlist mask `{m}'"));
					return;
				}
			},
			Some(m) => match m.parse::<u32>() {
				Ok(bits) if bits <= 32 => Ipv4Addr::from(if bits == 0 { 0 } else { u32::MAX << (32 - bits) }),
				_ => {
					self.diag(fn_, Some(lno), format!("invalid sortlist mask `{m}'"));
					return;
				}
			},
		};

		let entry = SortEntry { base, mask };

		if !entry.is_well_formed() {
			self.diag(fn_, Some(lno), format!("sortlist entry `{spec}' has bits outside its mask"));
			return;
		}

		if self.sortlist.len() >= MAX_SORTLIST {
			self.diag(fn_, Some(lno), format!("too many sortlist entries, ignoring `{spec}'"));
			return;
		}

		self.sortlist.push(entry);
	}

	fn apply_options(&mut self, words: &str) {
		for word in words.split_whitespace() {
			if word == "debug" {
				self.debug = true;
			} else if let Some(n) = word.strip_prefix("ndots:") {
				match n.parse() {
					Ok(n) => self.ndots = n,
					Err(_) => self.diag("options", None, format!("invalid ndots value `{n}'")),
				}
			}
		}
	}

	fn read_line(&mut self, fn_: &str, lno: usize, line: &str, depth: usize) {
		let line = line.split('#').next().unwrap_or("").trim();

		if line.is_empty() {
			return;
		}

		let Some((directive, rest)) = line.split_once(char::is_whitespace) else {
			if line == "clearnameservers" {
				self.servers.clear();
			}
			return;
		};

		let rest = rest.trim();

		match directive {
			"nameserver" => match parse_server(rest) {
				Some(addr) => {
					log::debug!("using nameserver {addr}");
					self.add_server(addr, fn_, lno);
				}
				None => self.diag(fn_, Some(lno), format!("invalid nameserver address `{rest}'")),
			},
			"domain" => self.search = vec![rest.to_owned()],
			"search" => self.search = rest.split_whitespace().map(String::from).collect(),
			"sortlist" => {
				for entry in rest.split_whitespace() {
					self.add_sortlist_entry(entry, fn_, lno);
				}
			}
			"options" => self.apply_options(rest),
			"clearnameservers" => self.servers.clear(),
			"include" => {
				if depth >= MAX_INCLUDE_DEPTH {
					self.diag(fn_, Some(lno), "include nesting too deep, ignored");
					return;
				}

				match std::fs::read_to_string(rest) {
					Ok(text) => self.read_text(rest, &text, depth + 1),
					Err(e) => {
						self.diag(fn_, Some(lno), format!("cannot open include file `{rest}': {e}"));
						self.save_err(format!("{rest}: {e}"));
					}
				}
			}
			_ => self.diag(fn_, Some(lno), format!("unknown configuration directive `{directive}'")),
		}
	}

	fn read_text(&mut self, fn_: &str, text: &str, depth: usize) {
		for (i, line) in text.lines().enumerate() {
			self.read_line(fn_, i + 1, line, depth);
		}
	}

	/// Builds configuration from the environment and `/etc/resolv.conf`
	/// (or its environment-supplied override), honoring `no_env` and the
	/// "options are applied twice, before and after files" precedence rule.
	pub fn from_environment(no_env: bool) -> Self {
		let mut cfg = Self { no_env, ..Self::default() };

		if no_env {
			return cfg.with_defaults();
		}

		if let Some(opts) = first_env(&["ADNS_RES_OPTIONS", "RES_OPTIONS"]) {
			cfg.apply_options(&opts);
		}

		if let Some(text) = first_env(&["ADNS_RES_CONF_TEXT", "RES_CONF_TEXT"]) {
			cfg.read_text("<config text>", &text, 0);
		} else {
			let path = first_env(&["ADNS_RES_CONF", "RES_CONF"]).unwrap_or_else(|| DEFAULT_RESOLV_CONF.to_owned());
			cfg.load_file(&path);
		}

		if let Some(domain) = first_env(&["ADNS_LOCALDOMAIN", "LOCALDOMAIN"]) {
			cfg.search = domain.split_whitespace().map(String::from).collect();
		}

		if let Some(opts) = first_env(&["ADNS_RES_OPTIONS", "RES_OPTIONS"]) {
			cfg.apply_options(&opts);
		}

		cfg.with_defaults()
	}

	/// Builds configuration purely from an in-memory string, bypassing the
	/// environment and filesystem entirely (`init_from_string`, used by
	/// callers and tests that want deterministic configuration).
	pub fn from_str_no_env(text: &str) -> Self {
		let mut cfg = Self { no_env: true, ..Self::default() };
		cfg.read_text("<string>", text, 0);
		cfg.with_defaults()
	}

	fn load_file(&mut self, path: impl AsRef<Path>) {
		let path = path.as_ref();

		match std::fs::read_to_string(path) {
			Ok(text) => self.read_text(&path.display().to_string(), &text, 0),
			Err(e) if path == Path::new(DEFAULT_RESOLV_CONF) => {
				self.diag("resolv.conf", None, format!("{}: {e} (ignored)", path.display()));
			}
			Err(e) => {
				let msg = format!("{}: {e}", path.display());
				self.diag("resolv.conf", None, &msg);
				self.save_err(msg);
			}
		}
	}

	fn with_defaults(mut self) -> Self {
		if self.servers.is_empty() {
			self.servers.push(SocketAddrV4::new(Ipv4Addr::LOCALHOST, DEFAULT_DNS_PORT));
		}

		self
	}
}

/// Parses a `nameserver` operand as either a bare `Ipv4Addr` (implicit
/// `DEFAULT_DNS_PORT`) or an explicit `addr:port`.
fn parse_server(text: &str) -> Option<SocketAddrV4> {
	if let Ok(addr) = text.parse::<SocketAddrV4>() {
		return Some(addr);
	}

	text.parse::<Ipv4Addr>().ok().map(|addr| SocketAddrV4::new(addr, DEFAULT_DNS_PORT))
}

fn first_env(names: &[&str]) -> Option<String> {
	names.iter().find_map(|name| std::env::var(name).ok())
}

fn legacy_class_mask(addr: Ipv4Addr) -> Ipv4Addr {
	let octet = addr.octets()[0];

	if octet < 128 {
		Ipv4Addr::new(255, 0, 0, 0)
	} else if octet < 192 {
		Ipv4Addr::new(255, 255, 0, 0)
	} else {
		Ipv4Addr::new(255, 255, 255, 0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_nameservers_and_defaults_ndots() {
		let cfg = ResolverConfig::from_str_no_env("nameserver 192.0.2.1\nnameserver 192.0.2.2\n");
		assert_eq!(cfg.servers, vec![SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 1), DEFAULT_DNS_PORT), SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 2), DEFAULT_DNS_PORT)]);
		assert_eq!(cfg.ndots, 1);
	}

	#[test]
	fn defaults_to_loopback_when_no_servers_configured() {
		let cfg = ResolverConfig::from_str_no_env("search example.test\n");
		assert_eq!(cfg.servers, vec![SocketAddrV4::new(Ipv4Addr::LOCALHOST, DEFAULT_DNS_PORT)]);
	}

	#[test]
	fn rejects_too_many_servers() {
		let mut text = String::new();
		for i in 0..(MAX_SERVERS + 2) {
			text.push_str(&format!("nameserver 192.0.2.{i}\n"));
		}

		let cfg = ResolverConfig::from_str_no_env(&text);
		assert_eq!(cfg.servers.len(), MAX_SERVERS);
	}

	#[test]
	fn sortlist_with_explicit_mask() {
		let cfg = ResolverConfig::from_str_no_env("sortlist 192.0.2.0/255.255.255.192\n");
		assert_eq!(cfg.sortlist, vec![SortEntry { base: Ipv4Addr::new(192, 0, 2, 0), mask: Ipv4Addr::new(255, 255, 255, 192) }]);
	}

	#[test]
	fn rejects_malformed_sortlist_entry() {
		let cfg = ResolverConfig::from_str_no_env("sortlist 192.0.2.65/255.255.255.192\n");
		assert!(cfg.sortlist.is_empty());
		assert!(!cfg.diagnostics.is_empty());
	}

	#[test]
	fn options_set_ndots_and_debug() {
		let cfg = ResolverConfig::from_str_no_env("options ndots:2 debug\n");
		assert_eq!(cfg.ndots, 2);
		assert!(cfg.debug);
	}
}
