//! Concurrent builds with per-document failure isolation.

use tokio::task::JoinSet;
use tracing::{error, info};

use crate::discovery::DocumentRef;
use crate::document::{BuildContext, Document};
use crate::error::{BuildError, error_chain};

/// Outcome of a build pass.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Successfully built documents, in reference order.
    pub documents: Vec<Document>,
    /// Every failed reference with its error.
    pub failures: Vec<(DocumentRef, BuildError)>,
}

impl BuildReport {
    pub fn had_errors(&self) -> bool {
        !self.failures.is_empty()
    }
}

fn log_failure(reference: &DocumentRef, err: &BuildError) {
    error!(reference = %reference, error = %error_chain(err), "Document build failed");
}

/// Build every reference concurrently.
///
/// One failing document never stops the others; every failure is logged and
/// reported. Outputs are published in reference order, so when two
/// references resolve to the same id the later one fails.
pub async fn build_all(ctx: &BuildContext, refs: &[DocumentRef]) -> BuildReport {
    let mut tasks = JoinSet::new();
    for (index, reference) in refs.iter().enumerate() {
        let ctx = ctx.clone();
        let mut document = Document::new(&ctx, reference.clone());
        tasks.spawn(async move {
            let prepared = document.prepare(&ctx).await;
            (index, document, prepared)
        });
    }

    let mut finished = vec![false; refs.len()];
    let mut prepared = Vec::new();
    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, document, result)) => {
                finished[index] = true;
                match result {
                    Ok(staged) => prepared.push((index, document, staged)),
                    Err(err) => failures.push((index, err)),
                }
            }
            Err(join_error) => error!(error = %join_error, "Build task failed"),
        }
    }
    for (index, done) in finished.iter().enumerate() {
        if !done {
            failures.push((index, BuildError::Task("build task did not complete".to_owned())));
        }
    }

    prepared.sort_by_key(|(index, _, _)| *index);
    let mut built = Vec::new();
    for (index, mut document, staged) in prepared {
        match document.publish(ctx, staged).await {
            Ok(()) => built.push(document),
            Err(err) => failures.push((index, err)),
        }
    }

    failures.sort_by_key(|(index, _)| *index);
    for (index, err) in &failures {
        log_failure(&refs[*index], err);
    }
    info!(
        built = built.len(),
        failed = failures.len(),
        "Build pass finished"
    );

    BuildReport {
        documents: built,
        failures: failures
            .into_iter()
            .map(|(index, e)| (refs[index].clone(), e))
            .collect(),
    }
}

/// Refresh `documents` concurrently, returning them with the refs that failed.
///
/// Failed documents are kept: they hold their previous output and whatever
/// dependencies the failed run consumed. Outputs are published in document
/// order.
pub async fn refresh_all(
    ctx: &BuildContext,
    documents: Vec<Document>,
) -> (Vec<Document>, Vec<(DocumentRef, BuildError)>) {
    let mut tasks = JoinSet::new();
    for (index, mut document) in documents.into_iter().enumerate() {
        let ctx = ctx.clone();
        tasks.spawn(async move {
            let prepared = document.prepare(&ctx).await;
            (index, document, prepared)
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(join_error) => {
                error!(error = %join_error, "Refresh task failed, document dropped");
            }
        }
    }
    results.sort_by_key(|(index, _, _)| *index);

    let mut refreshed = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for (_, mut document, prepared) in results {
        let result = match prepared {
            Ok(staged) => document.publish(ctx, staged).await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            log_failure(document.reference(), &err);
            failures.push((document.reference().clone(), err));
        }
        refreshed.push(document);
    }
    (refreshed, failures)
}
