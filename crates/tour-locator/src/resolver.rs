//! Target resolution with constraint filtering and specificity scoring

use std::sync::Arc;

use tracing::{debug, info, warn};

use tour_dom::{contains, is_visible, DomPort, ElementHandle, SearchScope};
use tour_editor_state::EditorStore;
use tourguide_core_types::{Locator, LocatorType, PlaybackConfig, PlaybackSession, Target};

use crate::block_selector::block_element;
use crate::errors::LocatorError;
use crate::strategies::*;
use crate::types::{RecoveryHook, Resolution};

const ID_BONUS: i32 = 20;
const TEST_ID_BONUS: i32 = 15;
const CONTAINER_BONUS: i32 = 10;
const VISIBLE_BONUS: i32 = 5;

/// Finds the one element a [`Target`] describes.
pub struct LocatorResolver {
    dom: Arc<dyn DomPort>,
    editor: Arc<dyn EditorStore>,
    session: PlaybackSession,
    config: Arc<PlaybackConfig>,
    css: CssStrategy,
    role: RoleStrategy,
    test_id: TestIdStrategy,
    data: DataAttributeStrategy,
    aria: AriaLabelStrategy,
    contextual: ContextualStrategy,
    block: BlockStrategy,
}

impl LocatorResolver {
    pub fn new(
        dom: Arc<dyn DomPort>,
        editor: Arc<dyn EditorStore>,
        session: PlaybackSession,
        config: Arc<PlaybackConfig>,
    ) -> Self {
        Self {
            block: BlockStrategy::new(editor.clone(), session.clone()),
            dom,
            editor,
            session,
            config,
            css: CssStrategy,
            role: RoleStrategy,
            test_id: TestIdStrategy,
            data: DataAttributeStrategy,
            aria: AriaLabelStrategy,
            contextual: ContextualStrategy,
        }
    }

    pub fn dom(&self) -> &Arc<dyn DomPort> {
        &self.dom
    }

    fn strategy(&self, kind: LocatorType) -> Option<&dyn Strategy> {
        match kind {
            LocatorType::Css => Some(&self.css),
            LocatorType::Role => Some(&self.role),
            LocatorType::TestId => Some(&self.test_id),
            LocatorType::DataAttribute => Some(&self.data),
            LocatorType::AriaLabel => Some(&self.aria),
            LocatorType::Contextual => Some(&self.contextual),
            LocatorType::WpBlock => Some(&self.block),
            LocatorType::Unknown => None,
        }
    }

    /// Main document, or the editor frame when the target says it lives there.
    pub fn search_scope(&self, target: &Target) -> Result<SearchScope, LocatorError> {
        let constraints = &target.constraints;
        let wants_frame = constraints.in_editor_iframe()
            || constraints
                .within_container
                .as_deref()
                .map(|container| self.config.is_iframe_region(container))
                .unwrap_or(false);
        if !wants_frame {
            return Ok(SearchScope::Main);
        }
        if !self.dom.has_editor_frame() {
            return Err(LocatorError::FrameUnavailable(
                "target is inside the editor canvas but its frame document is not loaded".to_string(),
            ));
        }
        Ok(SearchScope::EditorFrame)
    }

    /// Resolve `target` to exactly one element.
    pub async fn resolve(&self, target: &Target) -> Result<Resolution, LocatorError> {
        if target.is_empty() {
            return Err(LocatorError::NoMatch);
        }
        let scope = self.search_scope(target)?;
        let ctx = SearchContext {
            dom: self.dom.as_ref(),
            scope,
        };
        let anchor = if target.constraints.scope_to_selected_block() {
            self.selection_anchor().await
        } else {
            None
        };

        for locator in target.ordered_locators() {
            let Some(strategy) = self.strategy(locator.kind) else {
                debug!(locator = %locator, "unknown locator type, skipping");
                continue;
            };

            let found = match strategy.find(ctx, &locator.value).await {
                Ok(found) => found,
                Err(err) => {
                    warn!(locator = %locator, "strategy {} failed: {}", strategy.name(), err);
                    continue;
                }
            };

            let candidates = self.filter(target, found, anchor);
            debug!(locator = %locator, candidates = candidates.len(), "locator tried");

            let element = match candidates.len() {
                0 => continue,
                1 => candidates[0],
                n => match target.constraints.index {
                    Some(index) if index >= 0 && (index as usize) < n => candidates[index as usize],
                    _ => self.most_specific(target, locator, &candidates),
                },
            };

            info!(locator = %locator, element = %element, scope = scope.name(), "target resolved");
            return Ok(Resolution {
                element,
                used_locator: locator.clone(),
                scope,
                candidates: candidates.len(),
                recovered: false,
            });
        }

        Err(LocatorError::NoMatch)
    }

    /// Resolve; on failure run `recovery`, yield once, and retry exactly once.
    pub async fn resolve_with_recovery(
        &self,
        target: &Target,
        recovery: Option<&dyn RecoveryHook>,
    ) -> Result<Resolution, LocatorError> {
        let first = self.resolve(target).await;
        let Some(recovery) = recovery else {
            return first;
        };
        match first {
            Ok(resolution) => Ok(resolution),
            Err(err) => {
                debug!("resolution failed ({}), running recovery", err);
                recovery.recover().await;
                tokio::task::yield_now().await;
                let mut retried = self.resolve(target).await?;
                retried.recovered = true;
                Ok(retried)
            }
        }
    }

    fn filter(
        &self,
        target: &Target,
        mut candidates: Vec<ElementHandle>,
        anchor: Option<ElementHandle>,
    ) -> Vec<ElementHandle> {
        let dom = self.dom.as_ref();
        let constraints = &target.constraints;

        if constraints.requires_visible() {
            candidates.retain(|el| is_visible(dom, *el));
        }

        if let Some(container) = constraints.within_container.as_deref() {
            candidates.retain(|el| within_container(dom, *el, container));
        }

        if let Some(anchor) = anchor {
            candidates.retain(|el| contains(dom, anchor, *el));
        }

        candidates
    }

    /// Highest specificity score; the first of equal scorers wins.
    fn most_specific(
        &self,
        target: &Target,
        locator: &Locator,
        candidates: &[ElementHandle],
    ) -> ElementHandle {
        let dom = self.dom.as_ref();
        let mut best = candidates[0];
        let mut best_score = i32::MIN;
        for element in candidates {
            let mut score = i32::from(locator.weight);
            if dom.attribute(*element, "id").map_or(false, |id| !id.is_empty()) {
                score += ID_BONUS;
            }
            if dom.attribute(*element, "data-testid").is_some() {
                score += TEST_ID_BONUS;
            }
            if target.constraints.within_container.is_some() {
                score += CONTAINER_BONUS;
            }
            if is_visible(dom, *element) {
                score += VISIBLE_BONUS;
            }
            if score > best_score {
                best = *element;
                best_score = score;
            }
        }
        debug!(
            element = %best,
            score = best_score,
            tied = candidates.len(),
            "disambiguated by specificity"
        );
        best
    }

    /// Selected block's wrapper, else the element that last appeared.
    async fn selection_anchor(&self) -> Option<ElementHandle> {
        let dom = self.dom.as_ref();
        if let Ok(Some(id)) = self.editor.selected_block_id().await {
            if let Some(element) = block_element(dom, &id) {
                return Some(element);
            }
        }
        let identity = self.session.last_appeared()?;
        let block = identity.strip_prefix("block:")?;
        block_element(dom, block)
    }
}

/// Inside the first `container` match of the candidate's own document.
fn within_container(dom: &dyn DomPort, element: ElementHandle, container: &str) -> bool {
    let scope = dom.scope_of(element).unwrap_or(SearchScope::Main);
    match dom.query_all(scope, container) {
        Ok(found) => found
            .first()
            .map(|root| contains(dom, *root, element))
            .unwrap_or(false),
        Err(err) => {
            debug!("container selector '{}' failed: {}", container, err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tour_dom::{ElementSpec, MemoryDom};
    use tour_editor_state::InMemoryEditorStore;
    use tourguide_core_types::TargetConstraints;

    fn resolver(dom: Arc<MemoryDom>) -> LocatorResolver {
        LocatorResolver::new(
            dom,
            Arc::new(InMemoryEditorStore::new()),
            PlaybackSession::new(),
            Arc::new(PlaybackConfig::default()),
        )
    }

    fn css(value: &str, weight: u8) -> Locator {
        Locator::new(LocatorType::Css, value, weight)
    }

    #[tokio::test]
    async fn empty_target_fails_without_side_effects() {
        let dom = Arc::new(MemoryDom::new());
        let resolver = resolver(dom.clone());
        let err = resolver.resolve(&Target::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "No matching element found");
        assert_eq!(dom.highlighted(), None);
    }

    #[tokio::test]
    async fn hidden_candidates_are_filtered_unless_disabled() {
        let dom = Arc::new(MemoryDom::new());
        let body = dom.body(SearchScope::Main);
        dom.append(body, &ElementSpec::new("button").class("ghost").hidden());
        let resolver = resolver(dom);

        let target = Target::new(vec![css(".ghost", 60)]);
        assert_eq!(resolver.resolve(&target).await, Err(LocatorError::NoMatch));

        let target = target.with_constraints(TargetConstraints {
            visible: Some(false),
            ..TargetConstraints::default()
        });
        assert!(resolver.resolve(&target).await.is_ok());
    }

    #[tokio::test]
    async fn fallback_is_tried_only_after_primary() {
        let dom = Arc::new(MemoryDom::new());
        let body = dom.body(SearchScope::Main);
        let primary = dom.append(body, &ElementSpec::new("button").class("primary"));
        dom.append(body, &ElementSpec::new("button").class("secondary"));
        let resolver = resolver(dom);

        let target = Target::new(vec![
            css(".secondary", 99).as_fallback(),
            css(".primary", 10),
        ]);
        let resolution = resolver.resolve(&target).await.unwrap();
        assert_eq!(resolution.element, primary);
        assert!(!resolution.used_locator.fallback);
    }

    #[tokio::test]
    async fn index_and_specificity_disambiguate() {
        let dom = Arc::new(MemoryDom::new());
        let body = dom.body(SearchScope::Main);
        let first = dom.append(body, &ElementSpec::new("li"));
        let with_id = dom.append(body, &ElementSpec::new("li").id("chosen"));
        let resolver = resolver(dom);

        let target = Target::new(vec![css("li", 60)]);
        assert_eq!(resolver.resolve(&target).await.unwrap().element, with_id);

        let indexed = target.clone().with_constraints(TargetConstraints {
            index: Some(0),
            ..TargetConstraints::default()
        });
        assert_eq!(resolver.resolve(&indexed).await.unwrap().element, first);

        let out_of_range = target.with_constraints(TargetConstraints {
            index: Some(7),
            ..TargetConstraints::default()
        });
        assert_eq!(resolver.resolve(&out_of_range).await.unwrap().element, with_id);
    }

    #[tokio::test]
    async fn within_container_uses_first_container_match() {
        let dom = Arc::new(MemoryDom::new());
        let body = dom.body(SearchScope::Main);
        dom.append(body, &ElementSpec::new("aside").child(ElementSpec::new("button")));
        let inside = dom.append(
            body,
            &ElementSpec::new("nav").class("toolbar").child(ElementSpec::new("button")),
        );
        dom.append(body, &ElementSpec::new("nav").class("toolbar").child(ElementSpec::new("button")));
        let resolver = resolver(dom.clone());

        let target = Target::new(vec![css("button", 60)]).with_constraints(TargetConstraints {
            within_container: Some(".toolbar".into()),
            ..TargetConstraints::default()
        });
        let resolution = resolver.resolve(&target).await.unwrap();
        assert_eq!(dom.parent(resolution.element), Some(inside));
        assert_eq!(resolution.candidates, 1);
    }

    #[tokio::test]
    async fn missing_frame_fails_fast() {
        let dom = Arc::new(MemoryDom::new());
        let body = dom.body(SearchScope::Main);
        dom.append(body, &ElementSpec::new("p"));
        let resolver = resolver(dom);

        let target = Target::new(vec![css("p", 60)]).with_constraints(TargetConstraints {
            in_editor_iframe: Some(true),
            ..TargetConstraints::default()
        });
        assert!(matches!(
            resolver.resolve(&target).await,
            Err(LocatorError::FrameUnavailable(_))
        ));

        let by_region = Target::new(vec![css("p", 60)]).with_constraints(TargetConstraints {
            within_container: Some(".is-root-container".into()),
            ..TargetConstraints::default()
        });
        assert!(matches!(
            resolver.resolve(&by_region).await,
            Err(LocatorError::FrameUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn unknown_locator_types_are_skipped() {
        let dom = Arc::new(MemoryDom::new());
        let body = dom.body(SearchScope::Main);
        let button = dom.append(body, &ElementSpec::new("button").class("go"));
        let resolver = resolver(dom);

        let target = Target::new(vec![
            Locator::new(LocatorType::Unknown, "whatever", 100),
            css("button[", 90),
            css(".go", 50),
        ]);
        assert_eq!(resolver.resolve(&target).await.unwrap().element, button);
    }
}
