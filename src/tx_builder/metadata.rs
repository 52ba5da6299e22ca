//! Token metadata: on-chain instruction encoding and off-chain content store
//!
//! The metadata account of a mint is created by the token metadata program
//! (`CreateMetadataAccountV3`, discriminator 33). Its payload is borsh, so the
//! wire structs below mirror the program's layout field for field.
//!
//! The `uri` embedded in that payload points at an off-chain JSON document.
//! When the caller only has the document, a [`ContentStore`] uploads it before
//! assembly; a store failure aborts the attempt and is not retried here.
//!
//! A non-fungible mint is sealed by `CreateMasterEditionV3` (discriminator 17),
//! which takes over the mint and freeze authorities once the single token has
//! been minted.

use std::time::Duration;

use async_trait::async_trait;
use borsh::BorshSerialize;
use serde::{Deserialize, Serialize};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey,
    pubkey::Pubkey,
    system_program, sysvar,
};
use thiserror::Error;
use tracing::{debug, info};

/// Token metadata program
pub const TOKEN_METADATA_PROGRAM_ID: Pubkey = pubkey!("metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s");

/// Instruction discriminator of `CreateMetadataAccountV3`
pub const CREATE_METADATA_ACCOUNT_V3: u8 = 33;

/// Instruction discriminator of `CreateMasterEditionV3`
pub const CREATE_MASTER_EDITION_V3: u8 = 17;

pub const MAX_NAME_LENGTH: usize = 32;
pub const MAX_SYMBOL_LENGTH: usize = 10;
pub const MAX_URI_LENGTH: usize = 200;
pub const MAX_CREATOR_LIMIT: usize = 5;

/// Metadata validation and encoding failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("{field} is {len} bytes (max {max})")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("seller fee {0} basis points exceeds 10000")]
    InvalidSellerFee(u16),

    #[error("creator shares must sum to 100, got {0}")]
    InvalidCreatorShares(u32),

    #[error("at most 5 creators allowed, got {0}")]
    TooManyCreators(usize),

    /// The uri still points at an unuploaded document
    #[error("metadata uri is unresolved; upload the document first")]
    UnresolvedUri,

    #[error("payload encoding failed: {0}")]
    Encoding(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub address: Pubkey,
    pub verified: bool,
    pub share: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub verified: bool,
    pub key: Pubkey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UseMethod {
    Burn,
    Multiple,
    Single,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uses {
    pub use_method: UseMethod,
    pub remaining: u64,
    pub total: u64,
}

/// Off-chain descriptive document the metadata uri points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataDocument {
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub trait_type: String,
    pub value: String,
}

/// Where the metadata uri comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataUri {
    Resolved(String),
    /// Document to be uploaded to the content store before assembly
    Pending(MetadataDocument),
}

impl MetadataUri {
    pub fn resolved(&self) -> Option<&str> {
        match self {
            MetadataUri::Resolved(uri) => Some(uri),
            MetadataUri::Pending(_) => None,
        }
    }
}

/// Caller-facing metadata arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub uri: MetadataUri,
    pub seller_fee_basis_points: u16,
    pub creators: Option<Vec<Creator>>,
    pub collection: Option<Collection>,
    pub uses: Option<Uses>,
    pub is_mutable: bool,
    /// Set only when the mint is itself a sized collection
    pub collection_size: Option<u64>,
}

impl TokenMetadata {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, uri: MetadataUri) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            uri,
            seller_fee_basis_points: 0,
            creators: None,
            collection: None,
            uses: None,
            is_mutable: true,
            collection_size: None,
        }
    }

    pub fn with_seller_fee(mut self, basis_points: u16) -> Self {
        self.seller_fee_basis_points = basis_points;
        self
    }

    pub fn validate(&self) -> Result<(), MetadataError> {
        check_len("name", &self.name, MAX_NAME_LENGTH)?;
        check_len("symbol", &self.symbol, MAX_SYMBOL_LENGTH)?;
        if let MetadataUri::Resolved(uri) = &self.uri {
            check_len("uri", uri, MAX_URI_LENGTH)?;
        }
        if self.seller_fee_basis_points > 10_000 {
            return Err(MetadataError::InvalidSellerFee(self.seller_fee_basis_points));
        }
        if let Some(creators) = &self.creators {
            if creators.len() > MAX_CREATOR_LIMIT {
                return Err(MetadataError::TooManyCreators(creators.len()));
            }
            let total: u32 = creators.iter().map(|c| u32::from(c.share)).sum();
            if !creators.is_empty() && total != 100 {
                return Err(MetadataError::InvalidCreatorShares(total));
            }
        }
        Ok(())
    }
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), MetadataError> {
    if value.len() > max {
        return Err(MetadataError::FieldTooLong {
            field,
            len: value.len(),
            max,
        });
    }
    Ok(())
}

// Wire layout of CreateMetadataAccountArgsV3

#[derive(BorshSerialize)]
struct WireCreator {
    address: [u8; 32],
    verified: bool,
    share: u8,
}

#[derive(BorshSerialize)]
struct WireCollection {
    verified: bool,
    key: [u8; 32],
}

#[derive(BorshSerialize)]
struct WireUses {
    use_method: u8,
    remaining: u64,
    total: u64,
}

#[derive(BorshSerialize)]
enum WireCollectionDetails {
    V1 { size: u64 },
}

#[derive(BorshSerialize)]
struct WireDataV2 {
    name: String,
    symbol: String,
    uri: String,
    seller_fee_basis_points: u16,
    creators: Option<Vec<WireCreator>>,
    collection: Option<WireCollection>,
    uses: Option<WireUses>,
}

#[derive(BorshSerialize)]
struct WireCreateMetadataAccountArgsV3 {
    data: WireDataV2,
    is_mutable: bool,
    collection_details: Option<WireCollectionDetails>,
}

/// Encode the `CreateMetadataAccountV3` instruction payload
pub fn encode_create_metadata_v3(metadata: &TokenMetadata) -> Result<Vec<u8>, MetadataError> {
    metadata.validate()?;
    let uri = metadata.uri.resolved().ok_or(MetadataError::UnresolvedUri)?;

    let args = WireCreateMetadataAccountArgsV3 {
        data: WireDataV2 {
            name: metadata.name.clone(),
            symbol: metadata.symbol.clone(),
            uri: uri.to_string(),
            seller_fee_basis_points: metadata.seller_fee_basis_points,
            creators: metadata.creators.as_ref().map(|creators| {
                creators
                    .iter()
                    .map(|c| WireCreator {
                        address: c.address.to_bytes(),
                        verified: c.verified,
                        share: c.share,
                    })
                    .collect()
            }),
            collection: metadata.collection.as_ref().map(|c| WireCollection {
                verified: c.verified,
                key: c.key.to_bytes(),
            }),
            uses: metadata.uses.as_ref().map(|u| WireUses {
                use_method: match u.use_method {
                    UseMethod::Burn => 0,
                    UseMethod::Multiple => 1,
                    UseMethod::Single => 2,
                },
                remaining: u.remaining,
                total: u.total,
            }),
        },
        is_mutable: metadata.is_mutable,
        collection_details: metadata
            .collection_size
            .map(|size| WireCollectionDetails::V1 { size }),
    };

    let mut data = vec![CREATE_METADATA_ACCOUNT_V3];
    let body = borsh::to_vec(&args).map_err(|e| MetadataError::Encoding(e.to_string()))?;
    data.extend_from_slice(&body);
    Ok(data)
}

/// Build the `CreateMetadataAccountV3` instruction
///
/// Account order: metadata (w), mint, mint authority (s), payer (w, s),
/// update authority (s), system program.
pub fn create_metadata_account_v3(
    metadata_account: &Pubkey,
    mint: &Pubkey,
    mint_authority: &Pubkey,
    payer: &Pubkey,
    update_authority: &Pubkey,
    metadata: &TokenMetadata,
) -> Result<Instruction, MetadataError> {
    let data = encode_create_metadata_v3(metadata)?;
    Ok(Instruction {
        program_id: TOKEN_METADATA_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*metadata_account, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(*mint_authority, true),
            AccountMeta::new(*payer, true),
            AccountMeta::new_readonly(*update_authority, true),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data,
    })
}

#[derive(BorshSerialize)]
struct WireCreateMasterEditionArgs {
    max_supply: Option<u64>,
}

/// Encode the `CreateMasterEditionV3` payload; `Some(0)` forbids prints
pub fn encode_create_master_edition_v3(max_supply: Option<u64>) -> Result<Vec<u8>, MetadataError> {
    let mut data = vec![CREATE_MASTER_EDITION_V3];
    let body = borsh::to_vec(&WireCreateMasterEditionArgs { max_supply })
        .map_err(|e| MetadataError::Encoding(e.to_string()))?;
    data.extend_from_slice(&body);
    Ok(data)
}

/// Build the `CreateMasterEditionV3` instruction
///
/// Account order: edition (w), mint (w), update authority (s),
/// mint authority (s), payer (w, s), metadata (w), token program,
/// system program, rent sysvar.
pub fn create_master_edition_v3(
    edition_account: &Pubkey,
    mint: &Pubkey,
    update_authority: &Pubkey,
    mint_authority: &Pubkey,
    payer: &Pubkey,
    metadata_account: &Pubkey,
    max_supply: Option<u64>,
) -> Result<Instruction, MetadataError> {
    let data = encode_create_master_edition_v3(max_supply)?;
    Ok(Instruction {
        program_id: TOKEN_METADATA_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*edition_account, false),
            AccountMeta::new(*mint, false),
            AccountMeta::new_readonly(*update_authority, true),
            AccountMeta::new_readonly(*mint_authority, true),
            AccountMeta::new(*payer, true),
            AccountMeta::new(*metadata_account, false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new_readonly(sysvar::rent::id(), false),
        ],
        data,
    })
}

// ============================================================================
// Off-chain content store
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContentStoreError {
    #[error("content store transport error: {0}")]
    Transport(String),

    #[error("content store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("content store response invalid: {0}")]
    InvalidResponse(String),
}

impl ContentStoreError {
    /// Transport failures are worth a caller-driven retry; the rest are not
    pub fn is_transport(&self) -> bool {
        match self {
            ContentStoreError::Transport(_) => true,
            ContentStoreError::Status { status, .. } => *status >= 500,
            ContentStoreError::InvalidResponse(_) => false,
        }
    }
}

/// Off-chain storage for metadata documents
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store the document and return the uri to embed on-chain
    async fn upload(&self, document: &MetadataDocument) -> Result<String, ContentStoreError>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    uri: String,
}

/// Content store reached over HTTP: `POST <endpoint>` with the JSON document,
/// answered by `{"uri": "..."}`
#[derive(Debug, Clone)]
pub struct HttpContentStore {
    client: reqwest::Client,
    endpoint: String,
    auth_token: Option<String>,
}

impl HttpContentStore {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ContentStoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ContentStoreError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            auth_token: None,
        })
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

#[async_trait]
impl ContentStore for HttpContentStore {
    async fn upload(&self, document: &MetadataDocument) -> Result<String, ContentStoreError> {
        debug!(endpoint = %self.endpoint, name = %document.name, "uploading metadata document");

        let mut request = self.client.post(&self.endpoint).json(document);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ContentStoreError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ContentStoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: UploadResponse = response
            .json()
            .await
            .map_err(|e| ContentStoreError::InvalidResponse(e.to_string()))?;

        if parsed.uri.is_empty() {
            return Err(ContentStoreError::InvalidResponse("empty uri".to_string()));
        }

        info!(uri = %parsed.uri, "metadata document uploaded");
        Ok(parsed.uri)
    }
}
