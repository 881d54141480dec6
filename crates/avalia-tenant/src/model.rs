//! Tenant Data Model

use avalia_common::Clock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved id of the deployment's default tenant. Always present, never
/// deletable.
pub const DEFAULT_TENANT_ID: &str = "default";

/// Tenant definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    /// Unique tenant id
    pub id: String,
    /// Internal name (slug, unique across the deployment)
    pub name: String,
    /// Human-facing name
    pub display_name: String,
    /// Brazilian organization id (14 digits)
    pub cnpj: Option<String>,
    /// Custom domain
    pub domain: Option<String>,
    /// Soft-delete flag
    pub is_active: bool,
    /// Per-tenant configuration
    pub settings: TenantSettings,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
    /// Administrative metadata
    #[serde(default)]
    pub metadata: TenantMetadata,
}

/// Per-tenant configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantSettings {
    /// Visual customization
    pub branding: Option<BrandingConfig>,
    /// Feature flags
    #[serde(default)]
    pub features: FeatureSettings,
    /// Security policy
    #[serde(default)]
    pub security: SecuritySettings,
    /// Regional settings
    #[serde(default)]
    pub locale: LocaleSettings,
}

/// Branding configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrandingConfig {
    pub primary_color: Option<String>,
    pub secondary_color: Option<String>,
    pub logo_url: Option<String>,
    pub custom_css: Option<String>,
}

/// Feature flags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSettings {
    /// Contextual suggestions in the admin UI
    pub smart_hints_enabled: bool,
    /// Granularity of the audit trail
    pub audit_logging_level: AuditLoggingLevel,
    /// Seat limit
    pub max_users: Option<u32>,
    /// Tenant-configured audit retention window
    pub data_retention_days: Option<u32>,
}

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            smart_hints_enabled: true,
            audit_logging_level: AuditLoggingLevel::Basic,
            max_users: None,
            data_retention_days: None,
        }
    }
}

/// Audit trail granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditLoggingLevel {
    Basic,
    Detailed,
    Comprehensive,
}

/// Security policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySettings {
    pub require_two_factor: bool,
    pub password_policy: PasswordPolicy,
    /// Session timeout in minutes
    pub session_timeout: u32,
    #[serde(default)]
    pub ip_whitelist: Vec<String>,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            require_two_factor: false,
            password_policy: PasswordPolicy::default(),
            session_timeout: 480,
            ip_whitelist: Vec::new(),
        }
    }
}

/// Password requirements
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordPolicy {
    pub min_length: u32,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_numbers: bool,
    pub require_special_chars: bool,
    pub expiration_days: Option<u32>,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_numbers: true,
            require_special_chars: false,
            expiration_days: None,
        }
    }
}

/// Regional settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocaleSettings {
    pub language: String,
    pub currency: String,
    pub timezone: String,
    pub date_format: String,
}

impl Default for LocaleSettings {
    fn default() -> Self {
        Self {
            language: "pt-BR".into(),
            currency: "BRL".into(),
            timezone: "America/Sao_Paulo".into(),
            date_format: "DD/MM/YYYY".into(),
        }
    }
}

/// Administrative metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantMetadata {
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub address: Option<Address>,
    pub data_region: DataRegion,
    pub backup_frequency: Option<BackupFrequency>,
    pub lgpd_compliant: bool,
    pub data_processing_agreement: Option<String>,
    pub privacy_policy_url: Option<String>,
}

impl Default for TenantMetadata {
    fn default() -> Self {
        Self {
            contact_email: None,
            contact_phone: None,
            address: None,
            data_region: DataRegion::BrSoutheast,
            backup_frequency: None,
            lgpd_compliant: true,
            data_processing_agreement: None,
            privacy_policy_url: None,
        }
    }
}

/// Hosting region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataRegion {
    BrSouth,
    BrSoutheast,
    BrNortheast,
}

/// Backup cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupFrequency {
    Daily,
    Weekly,
    Monthly,
}

/// Postal address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub number: String,
    pub complement: Option<String>,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
}

/// Tenant creation request
#[derive(Debug, Clone, Default)]
pub struct NewTenant {
    /// Explicit id; generated when absent
    pub id: Option<String>,
    pub name: String,
    pub display_name: String,
    pub cnpj: Option<String>,
    pub domain: Option<String>,
    /// Defaults to active
    pub is_active: Option<bool>,
    /// Sections merged over the documented defaults
    pub settings: Option<TenantSettingsPatch>,
    /// Replaces the default metadata when supplied
    pub metadata: Option<TenantMetadata>,
}

impl NewTenant {
    /// Minimal request with just the required names.
    pub fn named(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            ..Self::default()
        }
    }
}

/// Partial settings: each supplied section replaces the default section.
#[derive(Debug, Clone, Default)]
pub struct TenantSettingsPatch {
    pub branding: Option<BrandingConfig>,
    pub features: Option<FeatureSettings>,
    pub security: Option<SecuritySettings>,
    pub locale: Option<LocaleSettings>,
}

impl TenantSettingsPatch {
    /// Merge over the documented defaults.
    pub fn merge_into_defaults(self) -> TenantSettings {
        let defaults = TenantSettings::default();
        TenantSettings {
            branding: self.branding.or(defaults.branding),
            features: self.features.unwrap_or(defaults.features),
            security: self.security.unwrap_or(defaults.security),
            locale: self.locale.unwrap_or(defaults.locale),
        }
    }
}

/// Tenant update request
#[derive(Debug, Clone, Default)]
pub struct TenantUpdate {
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub cnpj: Option<String>,
    pub domain: Option<String>,
    pub is_active: Option<bool>,
    /// Replaces the whole settings object
    pub settings: Option<TenantSettings>,
    /// Replaces the whole metadata object
    pub metadata: Option<TenantMetadata>,
}

impl Tenant {
    /// The deployment's default tenant, created on first start.
    pub fn default_tenant(clock: &dyn Clock) -> Self {
        let now = clock.now();
        Self {
            id: DEFAULT_TENANT_ID.into(),
            name: DEFAULT_TENANT_ID.into(),
            display_name: "Avalia".into(),
            cnpj: None,
            domain: None,
            is_active: true,
            settings: TenantSettings::default(),
            created_at: now,
            updated_at: now,
            metadata: TenantMetadata::default(),
        }
    }
}

/// CNPJ format check: exactly 14 digits once punctuation is stripped.
pub fn is_valid_cnpj(cnpj: &str) -> bool {
    cnpj.chars().filter(char::is_ascii_digit).count() == 14
}
