//! Folding raw usage into per-key buckets.

use crate::models::{Aggregated, Detail, Key, ManagedResource, Measure, UsageRecord};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Join managed resources with the namespace → organization map.
///
/// Resources without a claim namespace, or whose namespace has no
/// organization, are dropped.
pub fn attach_organizations(
    resources: &[ManagedResource],
    namespaces: &HashMap<String, String>,
) -> Vec<Detail> {
    resources
        .iter()
        .filter_map(|resource| {
            let Some(namespace) = resource.claim_namespace.as_deref() else {
                info!(
                    instance = %resource.name,
                    object_type = %resource.object_type,
                    "Namespace label is missing on managed resource, skipping"
                );
                return None;
            };
            let Some(organization) = namespaces.get(namespace) else {
                info!(
                    instance = %resource.name,
                    namespace = %namespace,
                    "Namespace not found in namespace list, skipping"
                );
                return None;
            };
            debug!(
                instance = %resource.name,
                namespace = %namespace,
                organization = %organization,
                "Added namespace and organization to managed resource"
            );
            Some(Detail {
                organization: organization.clone(),
                name: resource.name.clone(),
                namespace: namespace.to_string(),
                plan: resource.plan.clone().unwrap_or_default(),
                zone: resource.zone.clone().unwrap_or_default(),
                resource_type: resource.object_type.service_type().to_string(),
            })
        })
        .collect()
}

/// Aggregate usage by namespace, plan and resource type.
///
/// `Measure::Instances` counts matched instances, `Measure::Bytes` sums their
/// reported quantity. Details without usage, or whose type differs from the
/// usage's type, are skipped.
pub fn aggregate(
    usage: &[UsageRecord],
    details: &[Detail],
    measure: Measure,
) -> BTreeMap<Key, Aggregated> {
    info!(
        usage_records = usage.len(),
        details = details.len(),
        measure = %measure,
        "Aggregating usage by namespace and plan"
    );

    // Identities are unique per run; a repeated name keeps the last record.
    let usage_by_name: HashMap<&str, &UsageRecord> =
        usage.iter().map(|u| (u.name.as_str(), u)).collect();

    let mut buckets: BTreeMap<Key, Aggregated> = BTreeMap::new();
    for detail in details {
        debug!(instance = %detail.name, "Checking instance");

        let Some(record) = usage_by_name.get(detail.name.as_str()) else {
            info!(instance = %detail.name, "Could not find any usage for instance");
            continue;
        };
        if record.resource_type != detail.resource_type {
            info!(
                instance = %detail.name,
                declared_type = %detail.resource_type,
                usage_type = %record.resource_type,
                "Usage type does not match managed resource type, skipping"
            );
            continue;
        }

        // The billed plan comes from usage; the cluster may lag behind a resize.
        if !detail.plan.is_empty() && detail.plan != record.plan {
            info!(
                instance = %detail.name,
                declared_plan = %detail.plan,
                usage_plan = %record.plan,
                "Declared plan differs from billed plan"
            );
        }
        if !detail.zone.is_empty() && detail.zone != record.zone {
            warn!(
                instance = %detail.name,
                declared_zone = %detail.zone,
                usage_zone = %record.zone,
                "Declared zone differs from billed zone"
            );
        }

        let key = match Key::new(&detail.namespace, &record.plan, &record.resource_type) {
            Ok(key) => key,
            Err(e) => {
                warn!(instance = %detail.name, error = %e, "Cannot build aggregation key, skipping");
                continue;
            }
        };
        debug!(
            instance = %record.name,
            created_at = ?record.created_at,
            key = %key,
            "Found usage for instance"
        );

        let increment = match measure {
            Measure::Instances => 1.0,
            Measure::Bytes => record.quantity,
        };

        match buckets.get_mut(&key) {
            Some(bucket) => {
                if bucket.organization != detail.organization {
                    warn!(
                        key = %key,
                        previous = %bucket.organization,
                        organization = %detail.organization,
                        "Organization differs for the same key, keeping the latest"
                    );
                    bucket.organization = detail.organization.clone();
                }
                bucket.value += increment;
            }
            None => {
                buckets.insert(
                    key.clone(),
                    Aggregated {
                        key,
                        organization: detail.organization.clone(),
                        value: increment,
                    },
                );
            }
        }
    }

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ObjectType;

    fn usage(name: &str, plan: &str, resource_type: &str, quantity: f64) -> UsageRecord {
        UsageRecord {
            name: name.to_string(),
            plan: plan.to_string(),
            resource_type: resource_type.to_string(),
            zone: "ch-gva-2".to_string(),
            created_at: None,
            quantity,
        }
    }

    fn detail(name: &str, namespace: &str, organization: &str, resource_type: &str) -> Detail {
        Detail {
            organization: organization.to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            resource_type: resource_type.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn counts_instances_per_namespace_and_plan() {
        let usage = vec![usage("a", "p1", "pg", 0.0), usage("b", "p1", "pg", 0.0)];
        let details = vec![detail("a", "ns1", "org1", "pg"), detail("b", "ns1", "org1", "pg")];

        let buckets = aggregate(&usage, &details, Measure::Instances);

        assert_eq!(buckets.len(), 1);
        let bucket = &buckets[&Key::new("ns1", "p1", "pg").unwrap()];
        assert_eq!(bucket.value, 2.0);
        assert_eq!(bucket.organization, "org1");
    }

    #[test]
    fn separates_plans_and_types() {
        let usage = vec![
            usage("a", "p1", "pg", 0.0),
            usage("b", "p2", "pg", 0.0),
            usage("c", "p1", "mysql", 0.0),
        ];
        let details = vec![
            detail("a", "ns1", "org1", "pg"),
            detail("b", "ns1", "org1", "pg"),
            detail("c", "ns1", "org1", "mysql"),
        ];

        let buckets = aggregate(&usage, &details, Measure::Instances);

        assert_eq!(buckets.len(), 3);
        assert!(buckets.values().all(|b| b.value == 1.0));
    }

    #[test]
    fn sums_bytes_for_storage() {
        let usage = vec![
            usage("bucket-a", "default", "sos", 1024.0),
            usage("bucket-b", "default", "sos", 2048.0),
        ];
        let details = vec![
            detail("bucket-a", "ns1", "org1", "sos"),
            detail("bucket-b", "ns1", "org1", "sos"),
        ];

        let buckets = aggregate(&usage, &details, Measure::Bytes);

        assert_eq!(buckets[&Key::new("ns1", "default", "sos").unwrap()].value, 3072.0);
    }

    #[test]
    fn skips_details_without_usage_or_with_other_type() {
        let usage = vec![usage("a", "p1", "pg", 0.0), usage("b", "p1", "mysql", 0.0)];
        let details = vec![
            detail("a", "ns1", "org1", "pg"),
            detail("b", "ns1", "org1", "pg"),
            detail("missing", "ns1", "org1", "pg"),
        ];

        let buckets = aggregate(&usage, &details, Measure::Instances);

        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[&Key::new("ns1", "p1", "pg").unwrap()].value, 1.0);
    }

    #[test]
    fn latest_organization_wins_for_a_key() {
        let usage = vec![usage("a", "p1", "pg", 0.0), usage("b", "p1", "pg", 0.0)];
        let details = vec![detail("a", "ns1", "org1", "pg"), detail("b", "ns1", "org2", "pg")];

        let buckets = aggregate(&usage, &details, Measure::Instances);

        let bucket = &buckets[&Key::new("ns1", "p1", "pg").unwrap()];
        assert_eq!(bucket.organization, "org2");
        assert_eq!(bucket.value, 2.0);
    }

    #[test]
    fn duplicate_usage_identity_keeps_the_last_record() {
        let usage = vec![usage("a", "p1", "pg", 0.0), usage("a", "p2", "pg", 0.0)];
        let details = vec![detail("a", "ns1", "org1", "pg")];

        let buckets = aggregate(&usage, &details, Measure::Instances);

        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[&Key::new("ns1", "p2", "pg").unwrap()].value, 1.0);
    }

    #[test]
    fn billed_plan_wins_over_declared_plan() {
        let usage = vec![usage("a", "startup-4", "pg", 0.0)];
        let details = vec![Detail {
            plan: "hobbyist-2".to_string(),
            zone: "de-fra-1".to_string(),
            ..detail("a", "ns1", "org1", "pg")
        }];

        let buckets = aggregate(&usage, &details, Measure::Instances);

        assert!(buckets.contains_key(&Key::new("ns1", "startup-4", "pg").unwrap()));
    }

    fn resource(name: &str, object_type: ObjectType, namespace: Option<&str>) -> ManagedResource {
        ManagedResource {
            name: name.to_string(),
            object_type,
            claim_namespace: namespace.map(str::to_string),
            plan: None,
            zone: None,
        }
    }

    #[test]
    fn attaches_organizations_from_namespace_map() {
        let namespaces = HashMap::from([("ns1".to_string(), "org1".to_string())]);
        let resources = vec![
            ManagedResource {
                plan: Some("hobbyist-2".to_string()),
                zone: Some("ch-gva-2".to_string()),
                ..resource("a", ObjectType::Postgres, Some("ns1"))
            },
            resource("no-label", ObjectType::Postgres, None),
            resource("unknown-ns", ObjectType::Mysql, Some("ns2")),
        ];

        let details = attach_organizations(&resources, &namespaces);

        assert_eq!(
            details,
            vec![Detail {
                plan: "hobbyist-2".to_string(),
                zone: "ch-gva-2".to_string(),
                ..detail("a", "ns1", "org1", "pg")
            }]
        );
    }
}
