//! 集中的角色与归属检查
//! Centralized role and ownership checks

use crate::identity::{CurrentUser, Role};
use crate::modules::imaging::models::{OpKind, OpMethod};
use crate::modules::notification::models::Notification;
use crate::modules::sharing::models::{AccessVia, SharingGrant};

/// 只有医生可以发起共享 / Only doctors may grant
pub fn can_grant_share(actor: &CurrentUser) -> bool {
    actor.role == Role::Doctor
}

/// 只有医生可以接收共享 / Only doctors may receive a grant
pub fn can_receive_share(target_role: Option<Role>) -> bool {
    target_role == Some(Role::Doctor)
}

/// 授权发起人或共享链源头可以撤销 / The grant's source or the chain's origin may revoke
pub fn can_revoke(actor: &CurrentUser, grant: &SharingGrant) -> bool {
    actor.role == Role::Doctor && (grant.source_doctor_id == actor.id || grant.origin_doctor_id == actor.id)
}

/// 收件人是已读/删除状态的唯一权威 / The recipient alone mutates read/delete state
pub fn can_mutate_notification(actor: &CurrentUser, notification: &Notification) -> bool {
    notification.recipient_id == actor.id
}

/// 不带影像 ID 的归档代理（按医生所属医院或兜底端点）
/// Archive proxying without an image id
pub fn can_proxy_unscoped(actor: &CurrentUser) -> bool {
    matches!(actor.role, Role::Doctor | Role::Admin)
}

/// 共享只授予可见性：被授权者只能读 / A grant is visibility only, so grantees may only read
pub fn can_proxy_method(via: &AccessVia, method: OpMethod, kind: OpKind) -> bool {
    match via {
        AccessVia::Native => true,
        AccessVia::Grant(_) => method == OpMethod::Get && kind != OpKind::UploadBinary,
    }
}

/// 查看共享给自己的影像 / Listing images shared with oneself
pub fn can_list_shared(actor: &CurrentUser) -> bool {
    actor.role == Role::Doctor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::notification::models::NewNotification;
    use crate::modules::sharing::models::NewGrant;
    use chrono::Utc;

    fn grant_from(source: &str) -> SharingGrant {
        NewGrant {
            image_record_id: "img".to_string(),
            source_doctor_id: source.to_string(),
            target_doctor_id: "doc-b".to_string(),
            origin_doctor_id: source.to_string(),
            depth: 0,
        }
        .into_grant(Utc::now())
    }

    #[test]
    fn test_only_doctors_share() {
        assert!(can_grant_share(&CurrentUser::new("d", Role::Doctor)));
        for role in [Role::Nurse, Role::Patient, Role::Admin, Role::Staff] {
            assert!(!can_grant_share(&CurrentUser::new("x", role)));
        }
        assert!(can_receive_share(Some(Role::Doctor)));
        assert!(!can_receive_share(Some(Role::Patient)));
        assert!(!can_receive_share(None));
    }

    #[test]
    fn test_revoke_requires_source_or_origin() {
        let grant = grant_from("doc-a");
        assert!(can_revoke(&CurrentUser::new("doc-a", Role::Doctor), &grant));
        assert!(!can_revoke(&CurrentUser::new("doc-b", Role::Doctor), &grant));
        assert!(!can_revoke(&CurrentUser::new("doc-a", Role::Admin), &grant));

        let hop = NewGrant {
            image_record_id: "img".to_string(),
            source_doctor_id: "doc-b".to_string(),
            target_doctor_id: "doc-c".to_string(),
            origin_doctor_id: "doc-a".to_string(),
            depth: 1,
        }
        .into_grant(Utc::now());
        assert!(can_revoke(&CurrentUser::new("doc-b", Role::Doctor), &hop));
        assert!(can_revoke(&CurrentUser::new("doc-a", Role::Doctor), &hop));
        assert!(!can_revoke(&CurrentUser::new("doc-c", Role::Doctor), &hop));
    }

    #[test]
    fn test_grantee_proxies_reads_only() {
        let via = AccessVia::Grant(grant_from("doc-a"));
        assert!(can_proxy_method(&via, OpMethod::Get, OpKind::FetchBinary));
        assert!(can_proxy_method(&via, OpMethod::Get, OpKind::Metadata));
        assert!(!can_proxy_method(&via, OpMethod::Get, OpKind::UploadBinary));
        for method in [OpMethod::Post, OpMethod::Put, OpMethod::Delete] {
            assert!(!can_proxy_method(&via, method, OpKind::Metadata));
            assert!(can_proxy_method(&AccessVia::Native, method, OpKind::Metadata));
        }
    }

    #[test]
    fn test_notification_mutation_is_recipient_only() {
        let n = NewNotification::new("u1", "t", "m").into_notification(Utc::now());
        assert!(can_mutate_notification(&CurrentUser::new("u1", Role::Patient), &n));
        assert!(!can_mutate_notification(&CurrentUser::new("u2", Role::Admin), &n));
    }

    #[test]
    fn test_unscoped_proxy_roles() {
        assert!(can_proxy_unscoped(&CurrentUser::new("d", Role::Doctor)));
        assert!(can_proxy_unscoped(&CurrentUser::new("a", Role::Admin)));
        assert!(!can_proxy_unscoped(&CurrentUser::new("p", Role::Patient)));
    }
}
