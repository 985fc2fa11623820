use crate::solver::SolverStatistic;
use giputils::statistic::{Case, RunningTime};
use std::{fmt::Debug, time::Duration};

#[allow(unused)]
#[derive(Debug, Default)]
pub struct Statistic {
    case: Case,
    time: RunningTime,

    pub num_oracle_query: usize,
    pub num_banned: usize,

    pub dip_time: Duration,
    pub oracle_time: Duration,
    pub check_time: Duration,

    pub dip_solver: SolverStatistic,
    pub key_solver: SolverStatistic,
}

impl Statistic {
    pub fn new(mut case: &str) -> Self {
        if let Some((_, c)) = case.rsplit_once('/') {
            case = c;
        }
        Self {
            case: Case::new(case),
            ..Default::default()
        }
    }
}
