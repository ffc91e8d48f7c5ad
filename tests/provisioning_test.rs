//! Provisioning integration tests
//!
//! These tests create and destroy real tenant databases; they require
//! both `DATABASE_URL` (central registry) and `PROVISIONER_DATABASE_URL`
//! (an administrative MySQL credential) and skip themselves otherwise.

use campus_core::domain::CreateTenantInput;
use campus_core::error::AppError;
use campus_core::provisioner::{ProvisionRequest, Provisioner, TenantProvisioner};
use campus_core::resolver::Resolution;
use sqlx::{MySqlPool, Row};

mod common;

async fn database_exists(pool: &MySqlPool, name: &str) -> bool {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = ?")
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap();
    row.get::<i64, _>("n") > 0
}

async fn user_exists(pool: &MySqlPool, name: &str) -> bool {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM mysql.user WHERE User = ?")
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap();
    row.get::<i64, _>("n") > 0
}

#[tokio::test]
async fn test_provisioned_tenant_has_full_footprint() {
    let _guard = common::db_lock().await;
    let pool = match common::get_test_pool().await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Skipping test: could not connect to database: {}", e);
            return;
        }
    };
    common::setup_database(&pool).await.unwrap();
    common::cleanup_database(&pool).await.unwrap();

    let stack = match common::build_stack(&pool, &[]).await {
        Ok(stack) => stack,
        Err(e) => {
            eprintln!("Skipping test: {}", e);
            return;
        }
    };

    let provisioned = stack
        .service
        .create(CreateTenantInput {
            name: "Test Academy".to_string(),
            domain: "schoola.test".to_string(),
        })
        .await
        .unwrap();
    let tenant = &provisioned.tenant;

    assert!(database_exists(&pool, &tenant.database_name).await);
    assert!(user_exists(&pool, &tenant.database_username).await);
    assert_eq!(provisioned.admin_email, "admin@schoola.test");

    // The seeded admin carries an Argon2 hash and the must-change flag
    let bound = stack.router.bind(tenant).await.unwrap();
    let admin = sqlx::query("SELECT password, must_change_password FROM users WHERE role = 'admin'")
        .fetch_one(bound.pool())
        .await
        .unwrap();
    assert!(admin.get::<String, _>("password").starts_with("$argon2"));
    assert!(admin.get::<bool, _>("must_change_password"));

    // Resolution now finds the tenant
    match stack.resolver.resolve("schoola.test").await.unwrap() {
        Resolution::Tenant(resolved) => assert_eq!(resolved.id, tenant.id),
        Resolution::Central => panic!("expected tenant resolution"),
    }

    stack.service.delete(tenant.id).await.unwrap();
    common::cleanup_database(&pool).await.unwrap();
}

#[tokio::test]
async fn test_provision_refuses_existing_database_and_leaves_it_intact() {
    let _guard = common::db_lock().await;
    let pool = match common::get_test_pool().await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Skipping test: could not connect to database: {}", e);
            return;
        }
    };
    let admin_url = match common::provisioner_url() {
        Ok(url) => url,
        Err(e) => {
            eprintln!("Skipping test: {}", e);
            return;
        }
    };
    let provisioner = match TenantProvisioner::new(&admin_url).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Skipping test: provisioner unavailable: {}", e);
            return;
        }
    };

    let request = ProvisionRequest {
        database_name: "tenant_preexisting_ff00aa".to_string(),
        database_username: "tenant_preexisting_ff00aa".to_string(),
        database_password: "Abcdef123456Abcdef123456Abcdef12".to_string(),
        admin_name: "Administrator".to_string(),
        admin_email: "admin@preexisting.test".to_string(),
        admin_password: "Abcdef123456Abcdef123456Abcdef12".to_string(),
    };

    provisioner.provision(&request).await.unwrap();
    assert!(database_exists(&pool, &request.database_name).await);

    // A second run must refuse up front, without dropping the existing
    // database as "cleanup"
    let err = provisioner.provision(&request).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert!(database_exists(&pool, &request.database_name).await);

    provisioner
        .teardown(&request.database_name, &request.database_username)
        .await
        .unwrap();
    assert!(!database_exists(&pool, &request.database_name).await);
    assert!(!user_exists(&pool, &request.database_username).await);
}

#[tokio::test]
async fn test_delete_removes_database_user_and_resolution() {
    let _guard = common::db_lock().await;
    let pool = match common::get_test_pool().await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Skipping test: could not connect to database: {}", e);
            return;
        }
    };
    common::setup_database(&pool).await.unwrap();
    common::cleanup_database(&pool).await.unwrap();

    let stack = match common::build_stack(&pool, &[]).await {
        Ok(stack) => stack,
        Err(e) => {
            eprintln!("Skipping test: {}", e);
            return;
        }
    };

    let provisioned = stack
        .service
        .create(CreateTenantInput {
            name: "Valley Institute".to_string(),
            domain: "schoolb.test".to_string(),
        })
        .await
        .unwrap();
    let tenant = provisioned.tenant;

    stack.service.delete(tenant.id).await.unwrap();

    assert!(!database_exists(&pool, &tenant.database_name).await);
    assert!(!user_exists(&pool, &tenant.database_username).await);

    // Former domain no longer resolves
    let err = stack.resolver.resolve("schoolb.test").await.unwrap_err();
    assert!(matches!(err, AppError::DomainNotFound(_)));

    common::cleanup_database(&pool).await.unwrap();
}

#[tokio::test]
async fn test_reset_admin_password_rearms_must_change_flag() {
    let _guard = common::db_lock().await;
    let pool = match common::get_test_pool().await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Skipping test: could not connect to database: {}", e);
            return;
        }
    };
    common::setup_database(&pool).await.unwrap();
    common::cleanup_database(&pool).await.unwrap();

    let stack = match common::build_stack(&pool, &[]).await {
        Ok(stack) => stack,
        Err(e) => {
            eprintln!("Skipping test: {}", e);
            return;
        }
    };

    let provisioned = stack
        .service
        .create(CreateTenantInput {
            name: "Test Academy".to_string(),
            domain: "schoola.test".to_string(),
        })
        .await
        .unwrap();
    let tenant = provisioned.tenant;

    let bound = stack.router.bind(&tenant).await.unwrap();
    let before: String = sqlx::query("SELECT password FROM users WHERE role = 'admin'")
        .fetch_one(bound.pool())
        .await
        .unwrap()
        .get("password");

    // Simulate the admin completing first login
    sqlx::query("UPDATE users SET must_change_password = FALSE WHERE role = 'admin'")
        .execute(bound.pool())
        .await
        .unwrap();

    let new_password = stack
        .service
        .reset_admin_password(tenant.id, None)
        .await
        .unwrap();
    assert!(!new_password.is_empty());
    assert_ne!(new_password, provisioned.admin_initial_password);

    let row = sqlx::query("SELECT password, must_change_password FROM users WHERE role = 'admin'")
        .fetch_one(bound.pool())
        .await
        .unwrap();
    assert_ne!(row.get::<String, _>("password"), before);
    assert!(row.get::<bool, _>("must_change_password"));

    stack.service.delete(tenant.id).await.unwrap();
    common::cleanup_database(&pool).await.unwrap();
}
