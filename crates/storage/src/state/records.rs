// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Apply handlers for refresh, catalog, notification, and artifact records.

use super::StoreState;
use crate::event::StoreEvent;

pub(crate) fn apply(state: &mut StoreState, event: &StoreEvent) {
    match event {
        StoreEvent::RefreshRecorded { record } => {
            state.refresh_records.insert(record.view_name.clone(), record.clone());
        }

        StoreEvent::DatasetUpserted { dataset } => {
            state.datasets.insert(dataset.id.clone(), dataset.clone());
        }

        StoreEvent::ColumnProfileRecorded { profile } => {
            state.column_profiles.insert(profile.key(), profile.clone());
        }

        StoreEvent::LineageRecorded { edge } => {
            // Edges are upserts on (source, target, kind).
            if !state.lineage.contains(edge) {
                state.lineage.push(edge.clone());
            }
        }

        StoreEvent::NotificationRecorded { notification } => {
            state.notifications.push(notification.clone());
        }

        StoreEvent::ArtifactRecorded { artifact } => {
            state.artifacts.insert(artifact.id.clone(), artifact.clone());
        }

        _ => {}
    }
}
