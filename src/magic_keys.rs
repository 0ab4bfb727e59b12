//! Import of device keys from deep links.
//!
//! Links look like `<scheme>://add-magic-keys?irk=<hex>&enc_key=<hex>`; each
//! key is 16 bytes written as 32 hex characters. Keys are stored base64
//! encoded under `IRK` and `ENC_KEY`.

use std::{fmt, str::FromStr};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use log::{debug, info};
use smol_str::SmolStr;
use thiserror::Error;
use url::Url;

use crate::{
   error::{CompanionError, Result},
   prefs::{keys, store::PreferenceStore},
};

pub const KEY_LEN: usize = 16;
pub const KEY_HEX_LEN: usize = KEY_LEN * 2;

const HOST_ADD_MAGIC_KEYS: &str = "add-magic-keys";
const PARAM_IRK: &str = "irk";
const PARAM_ENC_KEY: &str = "enc_key";

/// Error type for key validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KeyError {
   #[error("expected 32 hex characters, got {0}")]
   WrongLength(usize),

   #[error("invalid hex: {0}")]
   InvalidHex(#[from] hex::FromHexError),

   #[error("link carries no keys")]
   NoKeys,
}

/// A 16-byte device key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MagicKey([u8; KEY_LEN]);

impl MagicKey {
   pub fn from_hex(s: &str) -> std::result::Result<Self, KeyError> {
      let len = s.chars().count();
      if len != KEY_HEX_LEN {
         return Err(KeyError::WrongLength(len));
      }
      let mut bytes = [0u8; KEY_LEN];
      hex::decode_to_slice(s, &mut bytes)?;
      Ok(Self(bytes))
   }

   pub const fn as_bytes(&self) -> &[u8; KEY_LEN] {
      &self.0
   }

   pub fn to_base64(&self) -> String {
      STANDARD.encode(self.0)
   }
}

impl FromStr for MagicKey {
   type Err = KeyError;

   fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
      Self::from_hex(s)
   }
}

// Key material stays out of logs.
impl fmt::Debug for MagicKey {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str("MagicKey(..)")
   }
}

/// Raw parameters of an add-magic-keys link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MagicKeysLink {
   pub irk: Option<SmolStr>,
   pub enc_key: Option<SmolStr>,
}

/// Parses a deep link. Query values are percent-decoded.
///
/// Returns `Ok(None)` for well-formed links that are not add-magic-keys
/// links of `scheme`.
pub fn parse_link(uri: &str, scheme: &str) -> Result<Option<MagicKeysLink>> {
   let url = Url::parse(uri).map_err(|e| {
      debug!("Rejecting link {uri:?}: {e}");
      CompanionError::InvalidUri(uri.to_string())
   })?;
   if !url.scheme().eq_ignore_ascii_case(scheme) {
      return Ok(None);
   }
   let host = url.host_str().unwrap_or_default();
   if host != HOST_ADD_MAGIC_KEYS {
      debug!("Ignoring link for host {host:?}");
      return Ok(None);
   }

   let mut link = MagicKeysLink::default();
   for (name, value) in url.query_pairs() {
      debug!("Link parameter: {name}");
      let slot = match name.as_ref() {
         PARAM_IRK => &mut link.irk,
         PARAM_ENC_KEY => &mut link.enc_key,
         _ => continue,
      };
      // First occurrence wins.
      if slot.is_none() {
         *slot = Some(SmolStr::new(value));
      }
   }
   Ok(Some(link))
}

/// Which keys an import stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportedKeys {
   pub irk: bool,
   pub enc_key: bool,
}

/// Validates every key of `link` and stores them in one commit.
///
/// Nothing is written unless all supplied keys are valid.
pub fn import(store: &PreferenceStore, link: &MagicKeysLink) -> Result<ImportedKeys> {
   let irk = link.irk.as_deref().map(MagicKey::from_hex).transpose()?;
   let enc_key = link.enc_key.as_deref().map(MagicKey::from_hex).transpose()?;
   if irk.is_none() && enc_key.is_none() {
      return Err(KeyError::NoKeys.into());
   }

   let mut editor = store.edit();
   if let Some(key) = irk {
      editor = editor.put(keys::IRK.key, key.to_base64().as_str());
   }
   if let Some(key) = enc_key {
      editor = editor.put(keys::ENC_KEY.key, key.to_base64().as_str());
   }
   editor.commit()?;

   let imported = ImportedKeys {
      irk: irk.is_some(),
      enc_key: enc_key.is_some(),
   };
   info!("Imported magic keys: {imported:?}");
   Ok(imported)
}
