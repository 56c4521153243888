//! Configuration validation.

use std::collections::HashSet;

use super::{Config, PropertyType};
use crate::error::{BulkError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Connection validation
    let conn = &config.connection;
    if conn.host.is_empty() {
        return Err(BulkError::Config("connection.host is required".into()));
    }
    if conn.database.is_empty() {
        return Err(BulkError::Config("connection.database is required".into()));
    }
    if conn.user.is_empty() {
        return Err(BulkError::Config("connection.user is required".into()));
    }
    if conn.port == 0 {
        return Err(BulkError::Config("connection.port must not be 0".into()));
    }
    match conn.ssl_mode.to_lowercase().as_str() {
        "disable" | "require" => {}
        other => {
            return Err(BulkError::Config(format!(
                "connection.ssl_mode must be 'disable' or 'require', got '{}'",
                other
            )))
        }
    }

    // Bulk options - only check if explicitly set
    if let Some(0) = config.bulk.batch_size {
        return Err(BulkError::Config("bulk.batch_size must be at least 1".into()));
    }
    if let Some(0) = config.bulk.bulk_copy_timeout {
        return Err(BulkError::Config(
            "bulk.bulk_copy_timeout must be at least 1".into(),
        ));
    }

    // Table mappings
    let mut seen = HashSet::new();
    for (i, mapping) in config.tables.iter().enumerate() {
        if mapping.table.is_empty() {
            return Err(BulkError::Config(format!("tables[{}].table is required", i)));
        }
        let key = mapping.table_name().to_string().to_lowercase();
        if !seen.insert(key) {
            return Err(BulkError::Config(format!(
                "table {} is mapped more than once",
                mapping.table_name()
            )));
        }
        if mapping.properties.is_empty() {
            return Err(BulkError::Config(format!(
                "table {} must map at least one property",
                mapping.table
            )));
        }
        for prop in &mapping.properties {
            if prop.column.is_empty() {
                return Err(BulkError::Config(format!(
                    "table {}: property column name is required",
                    mapping.table
                )));
            }
            if prop.property_type == PropertyType::Enum && prop.values.is_empty() {
                return Err(BulkError::Config(format!(
                    "table {}: enum property {} must declare values",
                    mapping.table, prop.column
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BulkConfig, ConnectionConfig, PropertyMapping, TableMapping};
    use std::collections::BTreeMap;

    fn valid_config() -> Config {
        Config {
            connection: ConnectionConfig {
                host: "localhost".to_string(),
                port: 1433,
                database: "app".to_string(),
                user: "sa".to_string(),
                password: "password".to_string(),
                ssl_mode: "disable".to_string(),
                app_name: None,
            },
            bulk: BulkConfig::default(),
            tables: vec![TableMapping {
                table: "Users".to_string(),
                schema: Some("dbo".to_string()),
                properties: vec![PropertyMapping {
                    column: "Id".to_string(),
                    field: None,
                    property_type: PropertyType::I32,
                    nullable: false,
                    values: BTreeMap::new(),
                }],
            }],
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_host() {
        let mut config = valid_config();
        config.connection.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_unknown_ssl_mode() {
        let mut config = valid_config();
        config.connection.ssl_mode = "verify-full".to_string();
        assert!(matches!(validate(&config), Err(BulkError::Config(_))));
    }

    #[test]
    fn test_zero_batch_size() {
        let mut config = valid_config();
        config.bulk.batch_size = Some(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_timeout() {
        let mut config = valid_config();
        config.bulk.bulk_copy_timeout = Some(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_table_without_properties() {
        let mut config = valid_config();
        config.tables[0].properties.clear();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_enum_without_values() {
        let mut config = valid_config();
        config.tables[0].properties[0].property_type = PropertyType::Enum;
        assert!(validate(&config).is_err());
        config.tables[0].properties[0]
            .values
            .insert("active".to_string(), 1);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_duplicate_table_mapping() {
        let mut config = valid_config();
        let dup = config.tables[0].clone();
        config.tables.push(dup);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_connection_debug_redacts_password() {
        let mut config = valid_config();
        config.connection.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.connection);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }
}
