//! Round execution plan: Jobs, Batches and the ParallelGroup

use std::collections::{BTreeSet, HashMap};

use tessera_primitives::Address;
use tessera_types::{SignedTransaction, Trace};
use tracing::error;

use crate::error::{SchedulerError, SchedulerResult};
use crate::rebalance::Mergeable;

/// Transactions that share accounts and run sequentially on one worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    transactions: Vec<SignedTransaction>,
    accounts: BTreeSet<Address>,
}

impl Job {
    /// Create a Job from its transactions and the accounts they touch
    pub fn new(transactions: Vec<SignedTransaction>, accounts: BTreeSet<Address>) -> Self {
        Self {
            transactions,
            accounts,
        }
    }

    /// Transactions in execution order
    pub fn transactions(&self) -> &[SignedTransaction] {
        &self.transactions
    }

    /// Accounts touched by any transaction of the Job
    pub fn accounts(&self) -> &BTreeSet<Address> {
        &self.accounts
    }

    /// Number of transactions
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// True if the Job holds no transactions
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Take the transactions
    pub fn into_transactions(self) -> Vec<SignedTransaction> {
        self.transactions
    }
}

impl Mergeable for Job {
    fn weight(&self) -> usize {
        self.transactions.len()
    }

    fn absorb(&mut self, other: Self) {
        self.transactions.extend(other.transactions);
        self.accounts.extend(other.accounts);
    }
}

/// Jobs that may run concurrently
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    jobs: Vec<Job>,
}

impl Batch {
    /// Create a Batch
    pub fn new(jobs: Vec<Job>) -> Self {
        Self { jobs }
    }

    /// Jobs in first-seen order
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Number of Jobs
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// True if the Batch holds no Jobs
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Transactions across all Jobs
    pub fn transaction_count(&self) -> usize {
        self.jobs.iter().map(Job::len).sum()
    }

    /// Job sizes
    pub fn job_sizes(&self) -> Vec<usize> {
        self.jobs.iter().map(Job::len).collect()
    }

    /// Take the Jobs
    pub fn into_jobs(self) -> Vec<Job> {
        self.jobs
    }

    /// Check that no two Jobs share an account
    pub fn check_disjoint(&self, batch: usize) -> SchedulerResult<()> {
        let mut owner: HashMap<Address, usize> = HashMap::new();
        for (job, j) in self.jobs.iter().enumerate() {
            for account in j.accounts() {
                if let Some(first_job) = owner.insert(*account, job) {
                    return Err(violation(batch, *account, first_job, job));
                }
            }
        }
        Ok(())
    }
}

pub(crate) fn violation(
    batch: usize,
    account: Address,
    first_job: usize,
    second_job: usize,
) -> SchedulerError {
    error!(
        batch,
        %account,
        first_job,
        second_job,
        "Two jobs of one batch touch the same account, aborting round"
    );
    SchedulerError::ConcurrencyInvariantViolation {
        batch,
        account,
        first_job,
        second_job,
    }
}

/// Execution plan for one round
#[derive(Debug, Clone, Default)]
pub struct ParallelGroup {
    batches: Vec<Batch>,
    excluded: Vec<(SignedTransaction, Trace)>,
    component_sizes: Vec<usize>,
}

impl ParallelGroup {
    /// Assemble a plan.
    ///
    /// `excluded` carries the transactions that were not planned together
    /// with their final Trace; `component_sizes` the sizes of the connected
    /// account groups the plan was derived from.
    pub fn new(
        batches: Vec<Batch>,
        excluded: Vec<(SignedTransaction, Trace)>,
        component_sizes: Vec<usize>,
    ) -> Self {
        Self {
            batches,
            excluded,
            component_sizes,
        }
    }

    /// Batches in execution order
    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    /// Transactions left out of the plan, each with its Trace
    pub fn excluded(&self) -> &[(SignedTransaction, Trace)] {
        &self.excluded
    }

    /// Sizes of the connected account groups
    pub fn component_sizes(&self) -> &[usize] {
        &self.component_sizes
    }

    /// Transactions placed in some Job
    pub fn scheduled_count(&self) -> usize {
        self.batches.iter().map(Batch::transaction_count).sum()
    }

    /// True if nothing was planned or excluded
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty() && self.excluded.is_empty()
    }

    /// Every planned transaction, Batch by Batch
    pub fn transactions(&self) -> impl Iterator<Item = &SignedTransaction> {
        self.batches
            .iter()
            .flat_map(|b| b.jobs())
            .flat_map(|j| j.transactions())
    }

    /// Check every Batch for shared accounts
    pub fn validate(&self) -> SchedulerResult<()> {
        self.batches
            .iter()
            .enumerate()
            .try_for_each(|(i, batch)| batch.check_disjoint(i))
    }

    /// Split into Batches and exclusions
    pub fn into_parts(self) -> (Vec<Batch>, Vec<(SignedTransaction, Trace)>) {
        (self.batches, self.excluded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_crypto::Signature;
    use tessera_types::Transaction;

    fn a(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    fn job(from: u64, to: u64) -> Job {
        let tx = SignedTransaction::new(Transaction::new(a(from), 0, a(to), "transfer"), Signature::default());
        Job::new(vec![tx], [a(from), a(to)].into_iter().collect())
    }

    #[test]
    fn test_disjoint_batch_passes() {
        let batch = Batch::new(vec![job(1, 2), job(3, 4)]);
        assert!(batch.check_disjoint(0).is_ok());
        assert_eq!(batch.transaction_count(), 2);
    }

    #[test]
    fn test_shared_account_detected() {
        let batch = Batch::new(vec![job(1, 2), job(3, 4), job(2, 5)]);
        assert_eq!(
            batch.check_disjoint(7),
            Err(SchedulerError::ConcurrencyInvariantViolation {
                batch: 7,
                account: a(2),
                first_job: 0,
                second_job: 2,
            })
        );
    }

    #[test]
    fn test_group_validate_reports_batch_index() {
        let group = ParallelGroup::new(
            vec![Batch::new(vec![job(1, 2)]), Batch::new(vec![job(3, 4), job(4, 9)])],
            Vec::new(),
            vec![3, 1],
        );
        assert!(matches!(
            group.validate(),
            Err(SchedulerError::ConcurrencyInvariantViolation { batch: 1, .. })
        ));
        assert_eq!(group.scheduled_count(), 3);
    }

    #[test]
    fn test_merged_job_keeps_order_and_accounts() {
        let mut first = job(1, 2);
        first.absorb(job(3, 4));
        assert_eq!(first.len(), 2);
        assert_eq!(first.transactions()[0].sender(), a(1));
        assert_eq!(first.accounts().len(), 4);
    }
}
