use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::storage::{Storage, StorageKind, encode_url_path};

/// Location of `path` in the form object store readers expect.
pub fn object_store_uri(storage: &Storage, path: &str) -> String {
    let path = path.trim_start_matches('/');
    match storage {
        Storage::Local(local) => local.full_path(path).to_string_lossy().into_owned(),
        Storage::Sftp(sftp) => sftp.build_url(path),
        Storage::GoogleCloud(gcs) => gcs.build_uri(path),
        Storage::Azure(azure) => {
            format!("abfs://{}/{}", azure.container_name(), encode_url_path(path))
        }
    }
}

/// Connection options keyed the way `object_store` names them.
pub fn object_store_options(storage: &Storage) -> Result<HashMap<String, String>> {
    let mut options = HashMap::new();
    match storage {
        Storage::Local(_) => {}
        Storage::Sftp(_) => {
            return Err(Error::unsupported("object store options", StorageKind::Sftp));
        }
        Storage::GoogleCloud(gcs) => {
            options.insert("bucket_name".to_string(), gcs.bucket_name().to_string());
            if let Some(path) = gcs.service_account_file() {
                options.insert("service_account".to_string(), path.to_string_lossy().into_owned());
            } else if let Some(info) = gcs.service_account_info() {
                options.insert("service_account_key".to_string(), info.to_string());
            }
        }
        Storage::Azure(azure) => {
            options.insert("account_name".to_string(), azure.account_name().to_string());
            if let Some(key) = azure.account_key() {
                options.insert("account_key".to_string(), key.to_string());
            }
            if let Some(sas) = azure.sas() {
                options.insert("sas_key".to_string(), sas.to_string());
            }
            if let Some(spn) = azure.service_principal() {
                options.insert("tenant_id".to_string(), spn.tenant_id.clone());
                options.insert("client_id".to_string(), spn.application_id.clone());
                options.insert("client_secret".to_string(), spn.client_secret.clone());
            }
        }
    }
    Ok(options)
}
