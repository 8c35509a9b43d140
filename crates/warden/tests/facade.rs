//! End-to-end tests driving the governance engine through the facade.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;

use warden::{
    DeploymentDefaults, FileUpload, GovernanceConfig, GovernanceError, GovernanceOverrides,
    GroupPermissions, GroupUpdate, MemoryBlobStore, MemoryDocumentStore, Principal, PrincipalId,
    Profile, Role, Warden,
};
use warden_store::{
    CollectionPath, DocPath, Document, DocumentStore, StoreError, StoreEvent, Transaction,
    WriteBatch, to_document,
};
use warden_types::paths as record_paths;

fn defaults_with(profile: Profile, config: GovernanceConfig) -> DeploymentDefaults {
    DeploymentDefaults { profile, config }
}

fn production_defaults() -> DeploymentDefaults {
    defaults_with(Profile::Production, GovernanceConfig::default())
}

async fn warden_with(defaults: DeploymentDefaults) -> (Warden, Arc<MemoryDocumentStore>) {
    let store = Arc::new(MemoryDocumentStore::new());
    let warden = Warden::new(store.clone(), Arc::new(MemoryBlobStore::new()), defaults);
    (warden, store)
}

/// Seeds a principal directly, bypassing the registration gate, so tests can
/// mint elevated roles.
async fn seed_user(store: &MemoryDocumentStore, role: Role) -> Principal {
    let mut p = Principal::new(format!("{role}@example.com"), role.to_string());
    p.role = role;
    store
        .create(&record_paths::user(p.id), to_document(&p).unwrap())
        .await
        .unwrap();
    p
}

async fn stored_user(store: &MemoryDocumentStore, id: PrincipalId) -> Principal {
    warden_store::from_document(&store.get(&record_paths::user(id)).await.unwrap().unwrap())
        .unwrap()
}

fn payload(len: usize) -> Bytes {
    Bytes::from(vec![0u8; len])
}

// ---------------------------------------------------------------------------
// users and roles
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_user_starts_with_defaults() {
    let (warden, store) = warden_with(production_defaults()).await;
    let user = warden.create_user("a@example.com", "A").await.unwrap();

    assert_eq!(user.role, Role::User);
    assert!(user.group_id.is_none());
    assert_eq!(user.file_upload_count, 0);
    assert_eq!(stored_user(&store, user.id).await, user);
}

#[tokio::test]
async fn registration_gate_is_enforced() {
    let mut config = GovernanceConfig::default();
    config.features.enable_registration = false;
    let (warden, _store) = warden_with(defaults_with(Profile::Production, config)).await;

    let err = warden.create_user("a@example.com", "A").await.unwrap_err();
    assert!(matches!(err, GovernanceError::PermissionDenied { .. }));
}

#[tokio::test]
async fn role_assignment_follows_the_matrix() {
    let (warden, store) = warden_with(production_defaults()).await;
    let admin = seed_user(&store, Role::Admin).await;
    let moderator = seed_user(&store, Role::Moderator).await;
    let user = seed_user(&store, Role::User).await;

    warden
        .update_user_role(user.id, Role::Editor, admin.id)
        .await
        .unwrap();
    assert_eq!(stored_user(&store, user.id).await.role, Role::Editor);

    // A moderator may hand out editor, but never admin.
    warden
        .update_user_role(user.id, Role::Editor, moderator.id)
        .await
        .unwrap();
    let err = warden
        .update_user_role(user.id, Role::Admin, moderator.id)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::PermissionDenied { .. }));
    assert_eq!(stored_user(&store, user.id).await.role, Role::Editor);
}

#[tokio::test]
async fn role_changes_require_permission_management() {
    let mut config = GovernanceConfig::default();
    config.features.enable_permissions = false;
    // Development profile: the deployment default is honored as-is.
    let (warden, store) = warden_with(defaults_with(Profile::Development, config)).await;
    let admin = seed_user(&store, Role::Admin).await;
    let user = seed_user(&store, Role::User).await;

    let err = warden
        .update_user_role(user.id, Role::Editor, admin.id)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::InvalidState { .. }));
}

#[tokio::test]
async fn listing_users_is_management_only() {
    let (warden, store) = warden_with(production_defaults()).await;
    let admin = seed_user(&store, Role::Admin).await;
    let user = seed_user(&store, Role::User).await;

    let listed = warden.list_users(admin.id).await.unwrap();
    assert_eq!(listed.len(), 2);

    let err = warden.list_users(user.id).await.unwrap_err();
    assert!(matches!(err, GovernanceError::PermissionDenied { .. }));
}

// ---------------------------------------------------------------------------
// files
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upload_and_delete_roundtrip() {
    let (warden, store) = warden_with(production_defaults()).await;
    let user = seed_user(&store, Role::User).await;

    let file = warden
        .upload_file(
            FileUpload::personal("notes.txt", payload(64), "text/plain"),
            user.id,
        )
        .await
        .unwrap();
    assert_eq!(file.size, 64);
    assert_eq!(file.owner_id, user.id);
    assert_eq!(stored_user(&store, user.id).await.file_upload_count, 1);

    let url = warden.file_url(file.id, user.id).await.unwrap();
    assert!(url.contains(&file.id.to_string()) || url.starts_with("memory://"));

    let listed = warden.list_files(user.id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, file.id);

    warden.delete_file(file.id, user.id).await.unwrap();
    assert!(warden.list_files(user.id).await.unwrap().is_empty());
    assert_eq!(stored_user(&store, user.id).await.file_upload_count, 0);
}

#[tokio::test]
async fn quota_denials_become_typed_errors() {
    let mut config = GovernanceConfig::default();
    config.quotas.max_file_count = 0;
    let (warden, store) = warden_with(defaults_with(Profile::Production, config)).await;
    let user = seed_user(&store, Role::User).await;

    let err = warden
        .upload_file(
            FileUpload::personal("notes.txt", payload(8), "text/plain"),
            user.id,
        )
        .await
        .unwrap_err();
    match err {
        GovernanceError::QuotaExceeded { reason } => {
            assert!(reason.contains("file count limit"), "got: {reason}");
        }
        other => panic!("expected QuotaExceeded, got {other}"),
    }
    // No counter movement on denial.
    assert_eq!(stored_user(&store, user.id).await.file_upload_count, 0);
}

/// Blob store whose writes always fail, for compensation-path tests.
struct BrokenBlobStore;

#[async_trait]
impl warden::BlobStore for BrokenBlobStore {
    async fn put(
        &self,
        _path: &str,
        _bytes: Bytes,
        _content_type: &str,
    ) -> warden_store::Result<warden_store::PutResult> {
        Err(StoreError::Unavailable("blob backend down".into()))
    }

    async fn url(&self, _path: &str) -> warden_store::Result<String> {
        Err(StoreError::Unavailable("blob backend down".into()))
    }

    async fn delete(&self, _path: &str) -> warden_store::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn failed_blob_write_releases_the_reservation() {
    let store = Arc::new(MemoryDocumentStore::new());
    let warden = Warden::new(store.clone(), Arc::new(BrokenBlobStore), production_defaults());
    let user = seed_user(&store, Role::User).await;

    let err = warden
        .upload_file(
            FileUpload::personal("notes.txt", payload(8), "text/plain"),
            user.id,
        )
        .await
        .unwrap_err();
    assert!(err.is_unavailable());
    // The reserved slot was handed back.
    assert_eq!(stored_user(&store, user.id).await.file_upload_count, 0);
}

#[tokio::test]
async fn only_owners_and_managers_delete_files() {
    let (warden, store) = warden_with(production_defaults()).await;
    let owner = seed_user(&store, Role::User).await;
    let stranger = seed_user(&store, Role::Editor).await;
    let moderator = seed_user(&store, Role::Moderator).await;

    let file = warden
        .upload_file(
            FileUpload::personal("a.txt", payload(8), "text/plain"),
            owner.id,
        )
        .await
        .unwrap();

    let err = warden.delete_file(file.id, stranger.id).await.unwrap_err();
    assert!(matches!(err, GovernanceError::PermissionDenied { .. }));

    warden.delete_file(file.id, moderator.id).await.unwrap();
    // The owner's counter is released even when a manager deletes.
    assert_eq!(stored_user(&store, owner.id).await.file_upload_count, 0);
}

#[tokio::test]
async fn sharing_gates_the_download_url() {
    let (warden, store) = warden_with(production_defaults()).await;
    let owner = seed_user(&store, Role::User).await;
    let friend = seed_user(&store, Role::User).await;

    let file = warden
        .upload_file(
            FileUpload::personal("a.txt", payload(8), "text/plain"),
            owner.id,
        )
        .await
        .unwrap();

    let err = warden.file_url(file.id, friend.id).await.unwrap_err();
    assert!(matches!(err, GovernanceError::PermissionDenied { .. }));

    warden.share_file(file.id, owner.id, friend.id).await.unwrap();
    warden.file_url(file.id, friend.id).await.unwrap();

    // A grant does not confer the right to re-share.
    let outsider = seed_user(&store, Role::User).await;
    let err = warden
        .share_file(file.id, friend.id, outsider.id)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::PermissionDenied { .. }));

    warden
        .unshare_file(file.id, owner.id, friend.id)
        .await
        .unwrap();
    assert!(!warden.can_access_file(friend.id, file.id).await.unwrap());
}

#[tokio::test]
async fn file_listing_is_filtered_by_access() {
    let (warden, store) = warden_with(production_defaults()).await;
    let admin = seed_user(&store, Role::Admin).await;
    let viewer = seed_user(&store, Role::User).await;
    let other = seed_user(&store, Role::User).await;

    // viewer's own file.
    let own = warden
        .upload_file(
            FileUpload::personal("own.txt", payload(8), "text/plain"),
            viewer.id,
        )
        .await
        .unwrap();

    // Someone else's private file.
    warden
        .upload_file(
            FileUpload::personal("private.txt", payload(8), "text/plain"),
            other.id,
        )
        .await
        .unwrap();

    // Someone else's public file.
    let mut public = FileUpload::personal("public.txt", payload(8), "text/plain");
    public.is_public = true;
    let public = warden.upload_file(public, other.id).await.unwrap();

    // A group file in the viewer's group.
    let group = warden
        .create_group("team", "the team", other.id, admin.id)
        .await
        .unwrap();
    warden
        .assign_user_to_group(viewer.id, group.id, admin.id)
        .await
        .unwrap();
    let group_file = warden
        .upload_file(
            FileUpload::group("shared.txt", payload(8), "text/plain", group.id),
            other.id,
        )
        .await
        .unwrap();

    let mut visible: Vec<_> = warden
        .list_files(viewer.id)
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.id)
        .collect();
    visible.sort();
    let mut expected = vec![own.id, public.id, group_file.id];
    expected.sort();
    assert_eq!(visible, expected);

    // Managers see everything.
    assert_eq!(warden.list_files(admin.id).await.unwrap().len(), 4);
}

// ---------------------------------------------------------------------------
// groups
// ---------------------------------------------------------------------------

#[tokio::test]
async fn group_lifecycle_through_the_facade() {
    let (warden, store) = warden_with(production_defaults()).await;
    let admin = seed_user(&store, Role::Admin).await;
    let owner = seed_user(&store, Role::User).await;
    let member = seed_user(&store, Role::User).await;

    let group = warden
        .create_group("team", "the team", owner.id, admin.id)
        .await
        .unwrap();

    let check = warden.validate_assignment(member.id, group.id).await.unwrap();
    assert!(check.valid);

    // The owner manages membership without an elevated role.
    warden
        .add_group_member(group.id, member.id, owner.id)
        .await
        .unwrap();
    assert_eq!(stored_user(&store, member.id).await.group_id, Some(group.id));

    warden
        .update_group(
            group.id,
            GroupUpdate {
                name: Some("renamed".into()),
                permissions: Some(GroupPermissions {
                    max_file_size: Some(1024),
                    ..GroupPermissions::default()
                }),
                ..GroupUpdate::default()
            },
            owner.id,
        )
        .await
        .unwrap();
    let groups = warden.list_groups().await.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].name, "renamed");
    assert_eq!(
        groups[0].permissions.as_ref().unwrap().max_file_size,
        Some(1024)
    );

    warden
        .remove_group_member(group.id, member.id, owner.id)
        .await
        .unwrap();
    warden.delete_group(group.id, owner.id).await.unwrap();
    assert!(warden.list_groups().await.unwrap().is_empty());
}

#[tokio::test]
async fn group_creation_requires_management_rights() {
    let (warden, store) = warden_with(production_defaults()).await;
    let user = seed_user(&store, Role::Editor).await;

    let err = warden
        .create_group("team", "d", user.id, user.id)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::PermissionDenied { .. }));
}

#[tokio::test]
async fn group_operations_respect_the_feature_flag() {
    let mut config = GovernanceConfig::default();
    config.features.enable_groups = false;
    let (warden, store) = warden_with(defaults_with(Profile::Development, config)).await;
    let admin = seed_user(&store, Role::Admin).await;

    let err = warden
        .create_group("team", "d", admin.id, admin.id)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::InvalidState { .. }));
}

// ---------------------------------------------------------------------------
// configuration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn config_updates_are_admin_only_and_take_effect() {
    let (warden, store) = warden_with(production_defaults()).await;
    let admin = seed_user(&store, Role::Admin).await;
    let user = seed_user(&store, Role::User).await;

    let err = warden
        .update_config(
            GovernanceOverrides {
                max_file_count: Some(1),
                ..Default::default()
            },
            user.id,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::PermissionDenied { .. }));

    warden
        .update_config(
            GovernanceOverrides {
                max_file_count: Some(1),
                ..Default::default()
            },
            admin.id,
        )
        .await
        .unwrap();
    assert_eq!(warden.get_config().await.quotas.max_file_count, 1);

    // The new ceiling is enforced immediately.
    warden
        .upload_file(
            FileUpload::personal("one.txt", payload(8), "text/plain"),
            user.id,
        )
        .await
        .unwrap();
    let err = warden
        .upload_file(
            FileUpload::personal("two.txt", payload(8), "text/plain"),
            user.id,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::QuotaExceeded { .. }));
}

#[tokio::test]
async fn maintenance_mode_blocks_non_admin_mutations() {
    let (warden, store) = warden_with(production_defaults()).await;
    let admin = seed_user(&store, Role::Admin).await;
    let user = seed_user(&store, Role::User).await;

    warden
        .update_config(
            GovernanceOverrides {
                maintenance_mode: Some(true),
                ..Default::default()
            },
            admin.id,
        )
        .await
        .unwrap();

    let err = warden
        .upload_file(
            FileUpload::personal("a.txt", payload(8), "text/plain"),
            user.id,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::InvalidState { .. }));

    let err = warden.create_user("b@example.com", "B").await.unwrap_err();
    assert!(matches!(err, GovernanceError::InvalidState { .. }));

    // Admins keep working, including switching maintenance off again.
    warden
        .create_group("ops", "operations", admin.id, admin.id)
        .await
        .unwrap();
    warden
        .update_config(
            GovernanceOverrides {
                maintenance_mode: Some(false),
                ..Default::default()
            },
            admin.id,
        )
        .await
        .unwrap();
    warden
        .upload_file(
            FileUpload::personal("a.txt", payload(8), "text/plain"),
            user.id,
        )
        .await
        .unwrap();
}

// ---------------------------------------------------------------------------
// graceful degradation
// ---------------------------------------------------------------------------

/// Store wrapper whose `list` fails with `Unavailable` on demand while
/// point reads keep working.
struct FlakyListStore {
    inner: Arc<MemoryDocumentStore>,
    fail_lists: AtomicBool,
}

#[async_trait]
impl DocumentStore for FlakyListStore {
    async fn get(&self, path: &DocPath) -> warden_store::Result<Option<Document>> {
        self.inner.get(path).await
    }

    async fn list(
        &self,
        collection: &CollectionPath,
    ) -> warden_store::Result<Vec<(DocPath, Document)>> {
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("backend unreachable".into()));
        }
        self.inner.list(collection).await
    }

    async fn create(&self, path: &DocPath, doc: Document) -> warden_store::Result<()> {
        self.inner.create(path, doc).await
    }

    async fn create_with_generated_id(
        &self,
        collection: &CollectionPath,
        doc: Document,
    ) -> warden_store::Result<DocPath> {
        self.inner.create_with_generated_id(collection, doc).await
    }

    async fn update(&self, path: &DocPath, patch: Document) -> warden_store::Result<()> {
        self.inner.update(path, patch).await
    }

    async fn delete(&self, path: &DocPath) -> warden_store::Result<()> {
        self.inner.delete(path).await
    }

    async fn subscribe(
        &self,
        path: &DocPath,
    ) -> warden_store::Result<broadcast::Receiver<StoreEvent>> {
        self.inner.subscribe(path).await
    }

    async fn begin(&self) -> warden_store::Result<Box<dyn Transaction>> {
        self.inner.begin().await
    }

    async fn commit_batch(&self, batch: WriteBatch) -> warden_store::Result<()> {
        self.inner.commit_batch(batch).await
    }
}

#[tokio::test]
async fn listings_degrade_to_empty_when_the_store_is_unreachable() {
    let inner = Arc::new(MemoryDocumentStore::new());
    let flaky = Arc::new(FlakyListStore {
        inner: inner.clone(),
        fail_lists: AtomicBool::new(false),
    });
    let warden = Warden::new(flaky.clone(), Arc::new(MemoryBlobStore::new()), production_defaults());

    let admin = seed_user(&inner, Role::Admin).await;
    warden
        .upload_file(
            FileUpload::personal("a.txt", payload(8), "text/plain"),
            admin.id,
        )
        .await
        .unwrap();
    assert_eq!(warden.list_files(admin.id).await.unwrap().len(), 1);

    flaky.fail_lists.store(true, Ordering::SeqCst);
    // Reads degrade to empty instead of failing.
    assert!(warden.list_files(admin.id).await.unwrap().is_empty());
    assert!(warden.list_groups().await.unwrap().is_empty());
    assert!(warden.list_users(admin.id).await.unwrap().is_empty());

    // Point reads and mutations still surface real errors or succeed.
    flaky.fail_lists.store(false, Ordering::SeqCst);
    assert_eq!(warden.list_files(admin.id).await.unwrap().len(), 1);
}
