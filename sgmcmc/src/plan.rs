use std::collections::HashMap;
use std::fmt;

use candle_core::{Result, Tensor, Var};

use crate::dynamics::Kinetics;
use crate::noise::NormalSampler;
use crate::param::Param;
use crate::precondition::{InverseMass, PreconditionState};

/// Which state variable of a parameter an assignment writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StateRole {
    /// the parameter θ itself
    Position,
    /// momentum p (SGHMC only)
    Momentum,
    /// decaying visit count xi
    Count,
    /// running gradient mean g
    Mean,
    /// running squared-gradient mean g2
    SecondMoment,
}

impl fmt::Display for StateRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Position => "theta",
            Self::Momentum => "p",
            Self::Count => "xi",
            Self::Mean => "g",
            Self::SecondMoment => "g2",
        };
        f.write_str(name)
    }
}

/// Identity of one state variable within a plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StateKey {
    /// index into the plan's parameter list
    pub param: usize,
    pub role: StateRole,
}

/// A state variable and the slot its next value is written to.
#[derive(Clone, Debug)]
pub struct Assignment {
    pub key: StateKey,
    pub target: Var,
}

/// Everything needed to compute the next values of one parameter.
#[derive(Clone, Debug)]
pub(crate) struct ParamTerm {
    pub param: Param,
    pub momentum: Option<Var>,
    pub precondition: Option<PreconditionState>,
}

/// Frozen set of state variables and how to compute their next values.
///
/// Built once per `prepare_updates` call. Evaluating the plan never writes
/// to any variable; [`NextState::commit`] does, after every next value has
/// been computed from the same snapshot.
#[derive(Clone, Debug)]
pub struct UpdatePlan {
    params: Vec<Param>,
    terms: Vec<ParamTerm>,
    kinetics: Kinetics,
    assignments: Vec<Assignment>,
}

impl UpdatePlan {
    pub(crate) fn build(terms: Vec<ParamTerm>, kinetics: Kinetics) -> Self {
        let mut assignments = vec![];

        for (i, term) in terms.iter().enumerate() {
            let mut push = |role: StateRole, target: &Var| {
                assignments.push(Assignment {
                    key: StateKey { param: i, role },
                    target: target.clone(),
                });
            };

            if let Some(pre) = &term.precondition {
                push(StateRole::Mean, pre.mean());
                push(StateRole::SecondMoment, pre.second_moment());
                push(StateRole::Count, pre.xi());
            }
            push(StateRole::Position, term.param.var());
            if let Some(p) = &term.momentum {
                push(StateRole::Momentum, p);
            }
        }

        let params = terms.iter().map(|t| t.param.clone()).collect();

        Self {
            params,
            terms,
            kinetics,
            assignments,
        }
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn kinetics(&self) -> &Kinetics {
        &self.kinetics
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Compute every next value from the current state.
    ///
    /// * `grads` - one gradient per parameter, in plan order
    /// * `noise` - standard normal source, drawn once per parameter
    pub fn evaluate(&self, grads: &[Tensor], noise: &mut dyn NormalSampler) -> Result<NextState> {
        if grads.len() != self.terms.len() {
            candle_core::bail!(
                "expected {} gradients, got {}",
                self.terms.len(),
                grads.len()
            );
        }

        let mut next = HashMap::with_capacity(self.assignments.len());

        for (i, (term, grad)) in self.terms.iter().zip(grads).enumerate() {
            let theta = term.param.as_tensor().detach();
            let grad = grad.detach();

            let minv = match &term.precondition {
                Some(pre) => {
                    let step = pre.advance(&grad)?;
                    next.insert(StateKey { param: i, role: StateRole::Mean }, step.g);
                    next.insert(StateKey { param: i, role: StateRole::SecondMoment }, step.g2);
                    next.insert(StateKey { param: i, role: StateRole::Count }, step.xi);
                    step.minv
                }
                None => InverseMass::Identity,
            };

            let z = noise.standard_normal(theta.shape(), theta.dtype(), theta.device())?;

            match (&self.kinetics, &term.momentum) {
                (Kinetics::Sghmc(k), Some(p)) => {
                    let p = p.as_tensor().detach();
                    let (p_next, theta_next) = k.transition(&theta, &p, &grad, &minv, &z)?;
                    next.insert(StateKey { param: i, role: StateRole::Momentum }, p_next);
                    next.insert(StateKey { param: i, role: StateRole::Position }, theta_next);
                }
                (Kinetics::Sgld(k), None) => {
                    let theta_next = k.transition(&theta, &grad, &minv, &z)?;
                    next.insert(StateKey { param: i, role: StateRole::Position }, theta_next);
                }
                (kinetics, _) => {
                    candle_core::bail!(
                        "{} plan has inconsistent momentum state for `{}`",
                        kinetics.name(),
                        term.param.name()
                    );
                }
            }
        }

        let mut values = Vec::with_capacity(self.assignments.len());
        for a in &self.assignments {
            let value = next.remove(&a.key).ok_or_else(|| {
                candle_core::Error::Msg(format!("no next value for {:?}", a.key))
            })?;
            values.push(NextValue {
                key: a.key,
                target: a.target.clone(),
                value,
            });
        }

        Ok(NextState { values })
    }
}

/// One computed but not yet written value.
pub struct NextValue {
    pub key: StateKey,
    pub target: Var,
    pub value: Tensor,
}

/// Next values of every assignment in a plan.
pub struct NextState {
    values: Vec<NextValue>,
}

impl NextState {
    pub fn get(&self, key: &StateKey) -> Option<&Tensor> {
        self.values.iter().find(|v| v.key == *key).map(|v| &v.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NextValue> {
        self.values.iter()
    }

    /// Write all next values into their variables.
    pub fn commit(self) -> Result<()> {
        for NextValue { target, value, .. } in self.values {
            target.set(&value)?;
        }
        Ok(())
    }
}
