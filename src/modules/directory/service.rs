//! 租户目录：决定某次影像操作应发往哪个归档
//! Tenant directory: decides which archive services an imaging operation

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use super::cache::TtlCache;
use super::models::{EndpointRef, ImageRecord, ResolutionSource};
use crate::store::{HospitalDirectory, ImageRecordRepo, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// 配置或授权缺口，与网络故障区分
    /// A configuration gap, distinct from a network failure
    #[error("影像端点未解析: {reason}")]
    EndpointUnresolved { reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct TenantDirectory {
    hospitals: Arc<dyn HospitalDirectory>,
    images: Arc<dyn ImageRecordRepo>,
    fallback: Option<String>,
    endpoints: TtlCache<String>,
    image_records: TtlCache<ImageRecord>,
    doctor_hospitals: TtlCache<String>,
}

impl TenantDirectory {
    pub fn new(
        hospitals: Arc<dyn HospitalDirectory>,
        images: Arc<dyn ImageRecordRepo>,
        fallback: Option<String>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            hospitals,
            images,
            fallback,
            endpoints: TtlCache::new(cache_ttl),
            image_records: TtlCache::new(cache_ttl),
            doctor_hospitals: TtlCache::new(cache_ttl),
        }
    }

    /// 解析端点，首条命中规则生效：
    /// 1. 影像存在 → 其所属医院的端点（来源归档权威）
    /// 2. 操作者是有所属医院的医生 → 该医院端点
    /// 3. 配置的兜底端点
    ///
    /// First matching rule wins: image origin, then acting doctor, then fallback.
    pub async fn resolve_endpoint(
        &self,
        acting_user_id: Option<&str>,
        image_id: Option<&str>,
    ) -> Result<EndpointRef, DirectoryError> {
        if let Some(image_id) = image_id {
            if let Some(image) = self.find_image(image_id).await? {
                return match self.hospital_endpoint(&image.owner_hospital_id).await? {
                    Some(base_url) => Ok(EndpointRef {
                        hospital_id: Some(image.owner_hospital_id),
                        base_url,
                        source: ResolutionSource::ImageOrigin,
                    }),
                    None => Err(self.unresolved(format!(
                        "hospital {} owning image {} has no imaging endpoint",
                        image.owner_hospital_id, image_id
                    ))),
                };
            }
            debug!(image_id, "image not found, trying acting doctor");
        }

        if let Some(user_id) = acting_user_id {
            if let Some(hospital_id) = self.doctor_hospital(user_id).await? {
                if let Some(base_url) = self.hospital_endpoint(&hospital_id).await? {
                    return Ok(EndpointRef {
                        hospital_id: Some(hospital_id),
                        base_url,
                        source: ResolutionSource::ActingDoctor,
                    });
                }
                debug!(user_id, hospital_id = %hospital_id, "doctor hospital has no endpoint");
            }
        }

        if let Some(base_url) = &self.fallback {
            return Ok(EndpointRef {
                hospital_id: None,
                base_url: base_url.clone(),
                source: ResolutionSource::Fallback,
            });
        }

        Err(self.unresolved(format!(
            "no endpoint for user {:?} and image {:?}",
            acting_user_id, image_id
        )))
    }

    /// 带缓存的影像记录查询 / Cached image record lookup
    pub async fn find_image(&self, image_id: &str) -> Result<Option<ImageRecord>, StoreError> {
        if let Some(hit) = self.image_records.get(image_id) {
            return Ok(Some(hit));
        }
        let found = self.images.find_image(image_id).await?;
        if let Some(record) = &found {
            self.image_records.insert(image_id, record.clone());
        }
        Ok(found)
    }

    /// 医生所属医院（非医生返回 None）/ Employing hospital of a doctor
    pub async fn doctor_hospital(&self, doctor_id: &str) -> Result<Option<String>, StoreError> {
        if let Some(hit) = self.doctor_hospitals.get(doctor_id) {
            return Ok(Some(hit));
        }
        let found = self.hospitals.doctor_hospital(doctor_id).await?;
        if let Some(h) = &found {
            self.doctor_hospitals.insert(doctor_id, h.clone());
        }
        Ok(found)
    }

    pub async fn hospital_endpoint(&self, hospital_id: &str) -> Result<Option<String>, StoreError> {
        if let Some(hit) = self.endpoints.get(hospital_id) {
            return Ok(Some(hit));
        }
        let found = self.hospitals.hospital_endpoint(hospital_id).await?;
        if let Some(url) = &found {
            self.endpoints.insert(hospital_id, url.clone());
        }
        Ok(found)
    }

    /// 医院端点变更后调用 / Call after a hospital endpoint changes
    pub fn invalidate_hospital(&self, hospital_id: &str) {
        self.endpoints.invalidate(hospital_id);
    }

    pub fn invalidate_image(&self, image_id: &str) {
        self.image_records.invalidate(image_id);
    }

    pub fn invalidate_doctor(&self, doctor_id: &str) {
        self.doctor_hospitals.invalidate(doctor_id);
    }

    fn unresolved(&self, reason: String) -> DirectoryError {
        error!("❌ {}", reason);
        DirectoryError::EndpointUnresolved { reason }
    }
}
