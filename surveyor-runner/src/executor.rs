//! Execution engine
//!
//! Every interview is driven by its own spawned task, which is the only
//! writer of that interview's [`AnswerContext`]. The driver evaluates stop
//! and skip conditions, answers functional and direct-answer questions
//! inline, renders prompts, and spawns one worker per provider-bound task.
//! Workers consult the cache, acquire the concurrency permits, call the
//! provider with retry, validate the answer and hand the finished record
//! back to the driver.

use crate::config::RunConfig;
use crate::error::{Result, RunError};
use crate::events::{EventSink, RunEvent};
use crate::job::{Interview, Job};
use crate::limits::ConcurrencyLimits;
use crate::report::{RunOutput, RunSummary, TaskException};
use crate::results::{InterviewRecord, Results};
use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use surveyor_cache::{CacheEntry, CacheKey, ResponseCache};
use surveyor_core::template::{TemplateContext, render};
use surveyor_core::{
    AnswerContext, AnswerRecord, AnswerSource, Environment, ErrorKind, LanguageModel, ModelRequest,
    ModelResponse, ModelSpec, ProviderError, QuestionKind, RenderedQuestion, Survey, TaskError,
    TaskStatus, Usage, parse_answer, render_prompt,
};
use surveyor_model::{ProviderRegistry, RetryPolicy, execute_with_retry};
use surveyor_telemetry::{
    Instrument, debug, error, info, interview_span, provider_call_span, run_span, task_span, warn,
};
use tokio::sync::Semaphore;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

/// Runs jobs against a provider registry
pub struct Runner {
    config: RunConfig,
    registry: Arc<ProviderRegistry>,
    cache: Option<Arc<dyn ResponseCache>>,
    events: EventSink,
}

impl Runner {
    pub fn new(config: RunConfig, registry: ProviderRegistry) -> Self {
        Self {
            config,
            registry: Arc::new(registry),
            cache: None,
            events: EventSink::default(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_events(mut self, sender: UnboundedSender<RunEvent>) -> Self {
        self.events = EventSink::new(Some(sender));
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub async fn run(&self, job: &Job) -> Result<RunOutput> {
        self.run_with_cancel(job, CancellationToken::new()).await
    }

    /// Run `job` until every task is terminal or `cancel` fires. A cancelled
    /// run still returns one row per interview; unfinished interviews are
    /// marked incomplete.
    pub async fn run_with_cancel(
        &self,
        job: &Job,
        cancel: CancellationToken,
    ) -> Result<RunOutput> {
        self.config.validate()?;
        let interviews = job.interviews()?;
        let span = run_span(interviews.len(), job.task_count());
        self.execute(job, interviews, cancel.child_token()).instrument(span).await
    }

    async fn execute(
        &self,
        job: &Job,
        interviews: Vec<Interview>,
        cancel: CancellationToken,
    ) -> Result<RunOutput> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let shared = Arc::new(Shared {
            survey: Arc::clone(job.survey()),
            registry: Arc::clone(&self.registry),
            cache: self.cache.clone(),
            policy: self.config.retry.to_policy(),
            limits: ConcurrencyLimits::new(
                &self.config,
                job.models().iter().map(|m| m.provider.as_str()),
            ),
            config: self.config.clone(),
            events: self.events.clone(),
            cancel: cancel.clone(),
            counters: Counters::default(),
        });

        info!(
            interviews = interviews.len(),
            questions = shared.survey.len(),
            "Starting survey run"
        );
        let timer = self.config.run_timeout().map(|limit| spawn_run_timer(limit, cancel.clone()));
        let gate = Arc::new(Semaphore::new(self.config.max_concurrent_interviews));

        let handles: Vec<JoinHandle<(InterviewRecord, Vec<TaskException>)>> = interviews
            .into_iter()
            .map(|interview| {
                let shared = Arc::clone(&shared);
                let gate = Arc::clone(&gate);
                let span = interview_span(interview.index, &interview.model.identity());
                tokio::spawn(
                    async move {
                        let _permit = tokio::select! {
                            biased;
                            _ = shared.cancel.cancelled() => None,
                            permit = gate.acquire_owned() => permit.ok(),
                        };
                        InterviewDriver::new(shared, interview).run().await
                    }
                    .instrument(span),
                )
            })
            .collect();

        let mut records = Vec::with_capacity(handles.len());
        let mut exceptions = Vec::new();
        for handle in handles {
            match handle.await {
                Ok((record, mut raised)) => {
                    records.push(record);
                    exceptions.append(&mut raised);
                }
                Err(err) => {
                    cancel.cancel();
                    return Err(RunError::Join(err.to_string()));
                }
            }
        }
        if let Some(timer) = timer {
            timer.abort();
        }

        let cancelled = cancel.is_cancelled();
        if cancelled {
            shared.events.emit(RunEvent::RunCancelled);
            info!("Survey run cancelled; unfinished interviews are reported as incomplete");
        }

        let survey = &shared.survey;
        exceptions.sort_by_key(|e| (e.interview_index, survey.index_of(&e.question)));
        let mut summary = summarize(survey, &records, &shared.counters, cancelled);
        summary.started_at = Some(started_at);
        summary.completed_at = Some(Utc::now());
        summary.duration = clock.elapsed();
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            provider_calls = summary.provider_calls,
            cache_hits = summary.cache_hits,
            "Survey run finished"
        );

        Ok(RunOutput { results: Results::assemble(survey, &records), exceptions, summary })
    }
}

fn spawn_run_timer(limit: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(limit) => {
                warn!(timeout_ms = limit.as_millis() as u64, "Run timeout reached; cancelling");
                cancel.cancel();
            }
        }
    })
}

fn summarize(
    survey: &Survey,
    records: &[InterviewRecord],
    counters: &Counters,
    cancelled: bool,
) -> RunSummary {
    let mut summary = RunSummary {
        interviews: records.len(),
        tasks: records.len() * survey.len(),
        provider_calls: counters.provider_calls.load(Ordering::SeqCst),
        cache_hits: counters.cache_hits.load(Ordering::SeqCst),
        cache_errors: counters.cache_errors.load(Ordering::SeqCst),
        cancelled,
        ..RunSummary::default()
    };

    for record in records {
        if record.complete {
            summary.complete_interviews += 1;
        } else {
            summary.incomplete_interviews += 1;
        }
        for name in survey.names() {
            match record.context.get(name) {
                Some(answer) => {
                    match answer.status {
                        TaskStatus::Succeeded => summary.succeeded += 1,
                        TaskStatus::Failed => summary.failed += 1,
                        TaskStatus::Skipped => summary.skipped += 1,
                        _ => summary.unfinished += 1,
                    }
                    if answer.cached {
                        summary.cached_usage.add(&answer.usage);
                    } else {
                        summary.live_usage.add(&answer.usage);
                    }
                }
                None => summary.unfinished += 1,
            }
        }
    }
    summary
}

#[derive(Default)]
struct Counters {
    provider_calls: AtomicU64,
    cache_hits: AtomicU64,
    cache_errors: AtomicU64,
}

/// State shared by every driver and worker of one run
struct Shared {
    survey: Arc<Survey>,
    registry: Arc<ProviderRegistry>,
    cache: Option<Arc<dyn ResponseCache>>,
    config: RunConfig,
    policy: RetryPolicy,
    limits: ConcurrencyLimits,
    events: EventSink,
    cancel: CancellationToken,
    counters: Counters,
}

/// A rendered task on its way to the cache or a provider
struct WorkItem {
    interview: usize,
    iteration: u32,
    question: String,
    kind: QuestionKind,
    rendered: RenderedQuestion,
    model: ModelSpec,
}

impl WorkItem {
    fn record(&self, base: AnswerRecord) -> AnswerRecord {
        base.with_prompt(self.rendered.prompt.clone())
            .with_question_text(self.rendered.question_text.clone())
    }
}

enum Prepared {
    Done(AnswerRecord),
    Dispatch(WorkItem),
}

enum TaskOutcome {
    Finished(AnswerRecord),
    /// Cancellation was observed before a provider permit was granted
    Abandoned,
}

type WorkerFuture = BoxFuture<'static, (usize, std::result::Result<TaskOutcome, JoinError>)>;

struct InterviewDriver {
    shared: Arc<Shared>,
    interview: Interview,
    context: AnswerContext,
    started: Vec<bool>,
    exceptions: Vec<TaskException>,
}

impl InterviewDriver {
    fn new(shared: Arc<Shared>, interview: Interview) -> Self {
        let started = vec![false; interview.tasks.len()];
        Self {
            shared,
            interview,
            context: AnswerContext::new(),
            started,
            exceptions: Vec::new(),
        }
    }

    async fn run(mut self) -> (InterviewRecord, Vec<TaskException>) {
        let index = self.interview.index;
        self.shared.events.emit(RunEvent::InterviewStarted { interview: index });
        debug!(interview = index, agent = %self.interview.agent_name(), "Interview started");

        let mut workers: FuturesUnordered<WorkerFuture> = FuturesUnordered::new();
        loop {
            if !self.shared.cancel.is_cancelled() {
                self.schedule(&mut workers);
            }
            let Some((question, joined)) = workers.next().await else {
                break;
            };
            let outcome = joined.unwrap_or_else(|err| {
                let err = TaskError::ProviderFatal(format!("task worker failed: {}", err));
                TaskOutcome::Finished(AnswerRecord::failed(&err))
            });
            self.finish(question, outcome);
        }

        let complete = self.interview.tasks.iter().all(|t| self.context.is_terminal(&t.name));
        self.shared.events.emit(RunEvent::InterviewFinished { interview: index, complete });
        debug!(interview = index, complete = complete, "Interview finished");

        let record = InterviewRecord { interview: self.interview, context: self.context, complete };
        (record, self.exceptions)
    }

    /// Start every eligible task. Tasks finished inline can unblock others,
    /// so scan until a pass makes no progress.
    fn schedule(&mut self, workers: &mut FuturesUnordered<WorkerFuture>) {
        let survey = Arc::clone(&self.shared.survey);
        loop {
            let mut progressed = false;
            for &q in survey.graph().order() {
                if self.started[q] || !self.is_eligible(q) {
                    continue;
                }
                if self.shared.cancel.is_cancelled() {
                    return;
                }
                self.started[q] = true;
                let name = self.interview.tasks[q].name.clone();
                self.context.set_status(&name, TaskStatus::Rendering);

                let prepared = panic::catch_unwind(AssertUnwindSafe(|| self.prepare(&survey, q)))
                    .unwrap_or_else(|payload| {
                        let err = TaskError::DirectAnswer(format!(
                            "answer code panicked: {}",
                            panic_message(payload.as_ref())
                        ));
                        Prepared::Done(AnswerRecord::failed(&err))
                    });
                match prepared {
                    Prepared::Done(record) => {
                        self.finish(q, TaskOutcome::Finished(record));
                        progressed = true;
                    }
                    Prepared::Dispatch(item) => {
                        self.context.set_status(&name, TaskStatus::Dispatched);
                        self.shared.events.emit(RunEvent::TaskDispatched {
                            interview: self.interview.index,
                            question: name.clone(),
                        });
                        let span = task_span(self.interview.index, &name);
                        let worker = execute_task(Arc::clone(&self.shared), item).instrument(span);
                        let handle = tokio::spawn(worker);
                        workers.push(async move { (q, handle.await) }.boxed());
                    }
                }
            }
            if !progressed {
                break;
            }
        }
    }

    fn is_eligible(&self, q: usize) -> bool {
        let tasks = &self.interview.tasks;
        tasks[q].predecessors.iter().all(|&p| self.context.is_terminal(&tasks[p].name))
    }

    fn prepare(&self, survey: &Survey, q: usize) -> Prepared {
        let question = survey.question(q);
        let interview = &self.interview;
        let traits = interview.agent.effective_traits(question);
        let env =
            Environment { answers: &self.context, scenario: &interview.scenario, traits: &traits };

        if survey.stopped_before(q, &env).is_true() {
            debug!(interview = interview.index, question = %question.name, "Skipped by stop rule");
            return Prepared::Done(AnswerRecord::skipped());
        }
        if survey.skip_truth(q, &env).is_true() {
            debug!(interview = interview.index, question = %question.name, "Skip condition holds");
            return Prepared::Done(AnswerRecord::skipped());
        }

        let template_ctx = TemplateContext {
            scenario: &interview.scenario,
            traits: &traits,
            answers: &self.context,
        };
        let question_text =
            || render(&question.text, &template_ctx).unwrap_or_else(|_| question.text.clone());

        if matches!(question.kind, QuestionKind::Functional) {
            let result = match &question.function {
                Some(function) => {
                    function(&interview.scenario, &interview.agent).map_err(TaskError::DirectAnswer)
                }
                None => Err(TaskError::DirectAnswer(format!(
                    "question '{}' has no function attached",
                    question.name
                ))),
            };
            return Prepared::Done(answered(result).with_question_text(question_text()));
        }

        if let AnswerSource::Direct(answerer) = &interview.agent.answer_source {
            let result = answerer
                .answer(question, &interview.scenario, &self.context)
                .map_err(TaskError::DirectAnswer);
            return Prepared::Done(answered(result).with_question_text(question_text()));
        }

        let memory = survey.memory(q);
        let rendered =
            render_prompt(question, &memory, &interview.agent, &interview.scenario, &self.context);
        match rendered {
            Ok(rendered) => Prepared::Dispatch(WorkItem {
                interview: interview.index,
                iteration: interview.iteration,
                question: question.name.clone(),
                kind: question.kind.clone(),
                rendered,
                model: interview.model.clone(),
            }),
            Err(err) => Prepared::Done(AnswerRecord::failed(&err)),
        }
    }

    fn finish(&mut self, q: usize, outcome: TaskOutcome) {
        let name = self.interview.tasks[q].name.clone();
        let record = match outcome {
            TaskOutcome::Finished(record) => record,
            TaskOutcome::Abandoned => {
                self.context.set_status(&name, TaskStatus::Pending);
                return;
            }
        };

        if let Some(failure) = &record.error {
            let index = self.interview.index;
            if failure.kind == ErrorKind::ProviderFatal {
                error!(
                    interview = index,
                    question = %name,
                    error = %failure.message,
                    "Task failed"
                );
            } else {
                warn!(
                    interview = index,
                    question = %name,
                    kind = %failure.kind,
                    error = %failure.message,
                    "Task failed"
                );
            }
            self.exceptions.push(TaskException {
                interview_index: index,
                question: name.clone(),
                kind: failure.kind,
                message: failure.message.clone(),
                attempts: record.attempts,
            });
            if self.shared.config.stop_on_exception && !self.shared.cancel.is_cancelled() {
                info!(interview = index, question = %name, "Stopping run after task failure");
                self.shared.cancel.cancel();
            }
        }

        self.shared.events.emit(RunEvent::TaskFinished {
            interview: self.interview.index,
            question: name.clone(),
            status: record.status,
            cached: record.cached,
        });
        self.context.record(name, record);
    }
}

fn answered(result: std::result::Result<Value, TaskError>) -> AnswerRecord {
    match result {
        Ok(answer) => AnswerRecord::succeeded(answer, None),
        Err(err) => AnswerRecord::failed(&err),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    match payload.downcast_ref::<&str>() {
        Some(message) => message.to_string(),
        None => {
            payload.downcast_ref::<String>().cloned().unwrap_or_else(|| "unknown panic".into())
        }
    }
}

fn reprompt_note(err: &TaskError) -> String {
    format!(
        "Your previous answer could not be used: {}\n\
         Please answer again, following the instructions exactly.",
        err.message()
    )
}

async fn execute_task(shared: Arc<Shared>, item: WorkItem) -> TaskOutcome {
    let key = CacheKey::derive(&item.rendered.prompt, &item.model, item.iteration);
    if let Some(record) = shared.cached_answer(&key, &item).await {
        return TaskOutcome::Finished(record);
    }

    let model = match shared.registry.get(&item.model.provider) {
        Ok(model) => model,
        Err(err) => return TaskOutcome::Finished(item.record(AnswerRecord::failed(&err.into()))),
    };
    let Some(_permit) = shared.limits.acquire(&item.model.provider, &shared.cancel).await else {
        debug!(
            interview = item.interview,
            question = %item.question,
            "Abandoned after cancellation"
        );
        return TaskOutcome::Abandoned;
    };

    let mut user_prompt = item.rendered.prompt.user_prompt.clone();
    let mut usage = Usage::default();
    let mut attempts = 0;
    let mut reprompts = 0;
    loop {
        let request = ModelRequest {
            system_prompt: item.rendered.prompt.system_prompt.clone(),
            user_prompt: user_prompt.clone(),
            model: item.model.clone(),
            question: item.question.clone(),
        };
        let outcome = execute_with_retry(&shared.policy, &shared.cancel, |attempt| {
            shared.call(&*model, request.clone(), attempt)
        })
        .await;
        attempts += outcome.attempts;

        let response = match outcome.result {
            Ok(response) => response,
            Err(err) => {
                let mut record = item.record(AnswerRecord::failed(&err.into()));
                record.usage = usage;
                record.attempts = attempts;
                return TaskOutcome::Finished(record);
            }
        };
        usage.add(&response.usage);

        match parse_answer(&item.kind, &item.rendered.options, &response.answer_text) {
            Ok(parsed) => {
                let mut record =
                    item.record(AnswerRecord::succeeded(parsed.answer, parsed.comment));
                record.raw_response = response.raw_response.clone();
                record.usage = usage;
                record.attempts = attempts;
                shared.store(key, &item, response).await;
                return TaskOutcome::Finished(record);
            }
            Err(err)
                if reprompts < shared.config.validation_retries && !shared.cancel.is_cancelled() =>
            {
                reprompts += 1;
                warn!(
                    interview = item.interview,
                    question = %item.question,
                    reprompt = reprompts,
                    error = %err,
                    "Answer failed validation; re-prompting"
                );
                user_prompt =
                    format!("{}\n\n{}", item.rendered.prompt.user_prompt, reprompt_note(&err));
            }
            Err(err) => {
                let mut record = item.record(AnswerRecord::failed(&err));
                record.raw_response = response.raw_response;
                record.usage = usage;
                record.attempts = attempts;
                return TaskOutcome::Finished(record);
            }
        }
    }
}

impl Shared {
    async fn call(
        &self,
        model: &dyn LanguageModel,
        request: ModelRequest,
        attempt: u32,
    ) -> std::result::Result<ModelResponse, ProviderError> {
        self.limits.throttle(&request.model.provider).await;
        self.counters.provider_calls.fetch_add(1, Ordering::SeqCst);
        let span = provider_call_span(&request.model.provider, &request.model.name, attempt);

        match self.config.task_timeout() {
            Some(limit) => {
                match tokio::time::timeout(limit, model.invoke(request)).instrument(span).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::timeout(format!(
                        "no response within {} ms",
                        limit.as_millis()
                    ))),
                }
            }
            None => model.invoke(request).instrument(span).await,
        }
    }

    /// A validated answer from the cache, or `None` on a miss. Cache errors
    /// and cached answers that no longer validate count as misses.
    async fn cached_answer(&self, key: &CacheKey, item: &WorkItem) -> Option<AnswerRecord> {
        if !self.config.cache_mode.reads() {
            return None;
        }
        let cache = self.cache.as_ref()?;
        let entry = match cache.get(key).await {
            Ok(entry) => entry?,
            Err(err) => {
                self.counters.cache_errors.fetch_add(1, Ordering::SeqCst);
                warn!(
                    interview = item.interview,
                    question = %item.question,
                    error = %err,
                    "Cache read failed; calling provider"
                );
                return None;
            }
        };

        match parse_answer(&item.kind, &item.rendered.options, &entry.response.answer_text) {
            Ok(parsed) => {
                self.counters.cache_hits.fetch_add(1, Ordering::SeqCst);
                debug!(
                    interview = item.interview,
                    question = %item.question,
                    key = %key,
                    "Cache hit"
                );
                let mut record =
                    item.record(AnswerRecord::succeeded(parsed.answer, parsed.comment));
                record.raw_response = entry.response.raw_response;
                record.usage = entry.response.usage;
                record.cached = true;
                Some(record)
            }
            Err(err) => {
                warn!(
                    interview = item.interview,
                    question = %item.question,
                    error = %err,
                    "Cached answer failed validation; calling provider"
                );
                None
            }
        }
    }

    async fn store(&self, key: CacheKey, item: &WorkItem, response: ModelResponse) {
        if !self.config.cache_mode.writes() {
            return;
        }
        let Some(cache) = &self.cache else {
            return;
        };
        let entry = CacheEntry::new(key, &item.model, item.iteration, response);
        if let Err(err) = cache.put(entry).await {
            self.counters.cache_errors.fetch_add(1, Ordering::SeqCst);
            warn!(
                interview = item.interview,
                question = %item.question,
                error = %err,
                "Cache write failed"
            );
        }
    }
}
