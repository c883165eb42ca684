use std::sync::Arc;

use sitedata_store::{
    AppGrants, NoAliasResolver, SiteData, SiteDataConfig, SiteRef, SiteValue,
    StaticNameResolver,
};

async fn open(dir: &std::path::Path) -> SiteData {
    let names = StaticNameResolver::new().with("beakerbrowser.com", "87ed2e3b");
    SiteData::open(dir, &SiteDataConfig::default(), Arc::new(names))
        .await
        .expect("open site data")
}

fn grants(pairs: &[(&str, &[&str])]) -> AppGrants {
    pairs
        .iter()
        .map(|(api, caps)| {
            (
                api.to_string(),
                caps.iter().map(|c| c.to_string()).collect(),
            )
        })
        .collect()
}

#[tokio::test]
async fn values_persist_across_reopen() {
    let tmp = tempfile::tempdir().expect("tmpdir");
    {
        let store = open(tmp.path()).await;
        store
            .set("https://example.com/a", "zoom", 1.25)
            .await
            .unwrap();
        assert!(store.db_path().unwrap().ends_with("SiteData"));
    }
    let store = open(tmp.path()).await;
    assert_eq!(
        store.get("https://example.com/b", "zoom").await.unwrap(),
        Some(SiteValue::Real(1.25))
    );
    assert_eq!(store.schema_version().await.unwrap(), 5);
}

#[tokio::test]
async fn verbatim_origin_and_url_share_rows() {
    let tmp = tempfile::tempdir().expect("tmpdir");
    let store = open(tmp.path()).await;
    assert!(store
        .set(SiteRef::Origin("https:example.com"), "theme", "dark")
        .await
        .unwrap());
    assert_eq!(
        store.get("https://example.com/x", "theme").await.unwrap(),
        Some(SiteValue::from("dark"))
    );

    store
        .set("https://example.com/settings", "theme", "light")
        .await
        .unwrap();
    assert_eq!(
        store
            .get(SiteRef::Origin("https:example.com"), "theme")
            .await
            .unwrap(),
        Some(SiteValue::from("light"))
    );

    // Alias origins are stored under the resolved host.
    store
        .set("dat://beakerbrowser.com/", "zoom", 2)
        .await
        .unwrap();
    assert_eq!(
        store.get(SiteRef::Origin("dat:87ed2e3b"), "zoom").await.unwrap(),
        Some(SiteValue::Integer(2))
    );
    assert!(store
        .clear(SiteRef::Origin("dat:87ed2e3b"), "zoom")
        .await
        .unwrap());
    assert_eq!(store.get("dat://beakerbrowser.com/", "zoom").await.unwrap(), None);
}

#[tokio::test]
async fn operations_wait_for_background_setup() {
    let tmp = tempfile::tempdir().expect("tmpdir");
    let store = SiteData::spawn_setup(
        tmp.path(),
        &SiteDataConfig::default(),
        Arc::new(NoAliasResolver),
    )
    .expect("spawn setup");
    // No explicit wait: the read itself blocks on setup.
    let favicon = store
        .get(SiteRef::Origin("https:duckduckgo.com"), "favicon")
        .await
        .unwrap();
    assert!(favicon.is_some());
    assert_eq!(store.setup_complete().await.unwrap(), 5);
}

#[tokio::test]
async fn permission_values_are_coerced() {
    let tmp = tempfile::tempdir().expect("tmpdir");
    let store = open(tmp.path()).await;
    let url = "https://example.com";
    for truthy in [SiteValue::from("granted"), SiteValue::from(7), SiteValue::from(true)] {
        store.set_permission(url, "camera", truthy).await.unwrap();
        assert_eq!(
            store.get_permission(url, "camera").await.unwrap(),
            Some(SiteValue::Integer(1))
        );
    }
    for falsy in [SiteValue::from(""), SiteValue::from(0), SiteValue::Null] {
        store.set_permission(url, "camera", falsy).await.unwrap();
        assert_eq!(
            store.get_permission(url, "camera").await.unwrap(),
            Some(SiteValue::Integer(0))
        );
    }
    store.clear_permission(url, "camera").await.unwrap();
    assert_eq!(store.get_permission(url, "camera").await.unwrap(), None);
}

#[tokio::test]
async fn app_permissions_replace_whole_set() {
    let tmp = tempfile::tempdir().expect("tmpdir");
    let store = open(tmp.path()).await;
    let url = "https://app.example.com";

    store
        .set_app_permissions(url, &grants(&[("fs", &["read", "write"])]))
        .await
        .unwrap();
    assert_eq!(
        store.get_app_permissions(url).await.unwrap(),
        grants(&[("fs", &["read", "write"])])
    );

    store
        .set_app_permissions(url, &grants(&[("fs", &["read"])]))
        .await
        .unwrap();
    assert_eq!(
        store.get_app_permissions(url).await.unwrap(),
        grants(&[("fs", &["read"])])
    );

    store.set_app_permissions(url, &AppGrants::new()).await.unwrap();
    assert!(store.get_app_permissions(url).await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_app_grants_write_nothing() {
    let tmp = tempfile::tempdir().expect("tmpdir");
    let store = open(tmp.path()).await;
    let url = "https://app.example.com";
    store
        .set_app_permissions(url, &grants(&[("fs", &["read"])]))
        .await
        .unwrap();
    let err = store
        .set_app_permissions(url, &grants(&[("bad:api", &["x"])]))
        .await;
    assert!(err.is_err());
    assert_eq!(
        store.get_app_permissions(url).await.unwrap(),
        grants(&[("fs", &["read"])])
    );
}

#[tokio::test]
async fn clear_everywhere_only_touches_named_permission() {
    let tmp = tempfile::tempdir().expect("tmpdir");
    let store = open(tmp.path()).await;
    let sites = ["https://a.example", "https://b.example", "https://c.example"];
    for site in sites {
        store.set_permission(site, "camera", true).await.unwrap();
        store.set_permission(site, "microphone", true).await.unwrap();
    }
    store.set("https://a.example", "camera", "not a permission").await.unwrap();

    assert_eq!(store.clear_permission_everywhere("camera").await.unwrap(), 3);
    for site in sites {
        assert_eq!(store.get_permission(site, "camera").await.unwrap(), None);
        assert_eq!(
            store.get_permission(site, "microphone").await.unwrap(),
            Some(SiteValue::Integer(1))
        );
    }
    assert_eq!(
        store.get("https://a.example", "camera").await.unwrap(),
        Some(SiteValue::from("not a permission"))
    );
}

#[tokio::test]
async fn network_permissions_exclude_denials() {
    let tmp = tempfile::tempdir().expect("tmpdir");
    let store = open(tmp.path()).await;
    let url = "https://example.com";
    store
        .set_permission(url, "network:https:api.example.com", true)
        .await
        .unwrap();
    store
        .set_permission(url, "network:blocked.example", false)
        .await
        .unwrap();
    store.set_permission(url, "network:cdn.example", 1).await.unwrap();

    let granted = store.get_network_permissions(url).await.unwrap();
    assert_eq!(granted, vec!["https:api.example.com", "cdn.example"]);
}

#[tokio::test]
async fn all_permissions_strip_prefix() {
    let tmp = tempfile::tempdir().expect("tmpdir");
    let store = open(tmp.path()).await;
    let url = "dat://beakerbrowser.com/";
    store.set_permission(url, "js", true).await.unwrap();
    store
        .set_permission(url, "network:example.com", false)
        .await
        .unwrap();
    store.set(url, "title", "Beaker").await.unwrap();

    let all = store.get_all_permissions(url).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all["js"], SiteValue::Integer(1));
    assert_eq!(all["network:example.com"], SiteValue::Integer(0));

    // Resolved alias host is what gets stored.
    let entries = store.entries(SiteRef::Origin("dat:87ed2e3b")).await.unwrap();
    assert_eq!(entries.len(), 3);
}

#[tokio::test]
async fn unresolvable_alias_degrades_to_empty() {
    let tmp = tempfile::tempdir().expect("tmpdir");
    let store = open(tmp.path()).await;
    let url = "dat://unknown.example/";
    assert!(!store.set_permission(url, "js", true).await.unwrap());
    assert!(store.get_all_permissions(url).await.unwrap().is_empty());
    assert!(store.get_network_permissions(url).await.unwrap().is_empty());
    assert!(store.get_app_permissions(url).await.unwrap().is_empty());
    assert!(!store
        .set_app_permissions(url, &grants(&[("fs", &["read"])]))
        .await
        .unwrap());
}

#[tokio::test]
async fn concurrent_writers_share_one_connection() {
    let tmp = tempfile::tempdir().expect("tmpdir");
    let store = open(tmp.path()).await;
    let mut tasks = Vec::new();
    for i in 0..16 {
        let s = store.clone();
        tasks.push(tokio::spawn(async move {
            let url = format!("https://site{i}.example");
            s.set(url.as_str(), "n", i as i64).await.unwrap();
            s.get(url.as_str(), "n").await.unwrap()
        }));
    }
    for (i, task) in tasks.into_iter().enumerate() {
        assert_eq!(task.await.unwrap(), Some(SiteValue::Integer(i as i64)));
    }
}
