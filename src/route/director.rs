use std::fmt;

use super::{Route, RouteState};

/// The next action needed to bring a connection onto its planned route.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Step {
    ConnectTarget,
    ConnectProxy,
    CreateTunnel,
    LayerProtocol,
    Complete,
    Unreachable,
}

impl Step {
    /// Whether the caller has to act and ask again.
    pub fn is_action(self) -> bool {
        !matches!(self, Step::Complete | Step::Unreachable)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::ConnectTarget => "connect-target",
            Step::ConnectProxy => "connect-proxy",
            Step::CreateTunnel => "create-tunnel",
            Step::LayerProtocol => "layer-protocol",
            Step::Complete => "complete",
            Step::Unreachable => "unreachable",
        };
        f.write_str(name)
    }
}

/// Decides how to get from an established state to a planned route.
///
/// Stateless; only routes with at most one proxy exist, so establishment
/// takes at most four steps including the final `Complete`.
#[derive(Clone, Copy, Debug, Default)]
pub struct RouteDirector;

impl RouteDirector {
    pub fn next_step(&self, planned: &Route, current: Option<&RouteState>) -> Step {
        match current {
            Some(fact) if fact.is_connected() => {
                if planned.proxy().is_some() {
                    Self::proxied_step(planned, fact)
                } else {
                    Self::direct_step(planned, fact)
                }
            }
            _ => Self::first_step(planned),
        }
    }

    fn first_step(planned: &Route) -> Step {
        if planned.proxy().is_some() {
            Step::ConnectProxy
        } else {
            Step::ConnectTarget
        }
    }

    fn direct_step(planned: &Route, fact: &RouteState) -> Step {
        if fact.proxy().is_some()
            || fact.target() != planned.target()
            || fact.is_tunnelled()
            || fact.is_layered()
            || fact.is_secure() != planned.is_secure()
        {
            return Step::Unreachable;
        }

        Step::Complete
    }

    fn proxied_step(planned: &Route, fact: &RouteState) -> Step {
        // ConnectProxy is never issued twice: a connection to any other
        // first hop cannot be turned into this route.
        if fact.proxy() != planned.proxy() || fact.target() != planned.target() {
            return Step::Unreachable;
        }

        if fact.is_tunnelled() && !planned.is_tunnelled() {
            return Step::Unreachable;
        }
        if fact.is_layered() && !planned.is_layered() {
            return Step::Unreachable;
        }

        if planned.is_tunnelled() && !fact.is_tunnelled() {
            return Step::CreateTunnel;
        }
        if planned.is_layered() && !fact.is_layered() {
            return Step::LayerProtocol;
        }

        if planned.is_secure() != fact.is_secure() {
            return Step::Unreachable;
        }

        Step::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::{HttpHost, LayerType, TunnelType};

    fn target() -> HttpHost {
        HttpHost::new("target.example", 443)
    }

    fn proxy() -> HttpHost {
        HttpHost::new("proxy.example", 8080)
    }

    /// Applies each step the way a connection would and records the sequence.
    fn walk(planned: &Route) -> Vec<Step> {
        let director = RouteDirector;
        let mut state: Option<RouteState> = None;
        let mut steps = Vec::new();

        loop {
            let step = director.next_step(planned, state.as_ref());
            steps.push(step);
            match step {
                Step::ConnectTarget => {
                    let mut s = RouteState::new(planned.target().clone());
                    s.connect_target(planned.is_secure()).unwrap();
                    state = Some(s);
                }
                Step::ConnectProxy => {
                    let mut s = RouteState::new(planned.target().clone());
                    s.connect_proxy(planned.proxy().unwrap().clone(), false)
                        .unwrap();
                    state = Some(s);
                }
                Step::CreateTunnel => state.as_mut().unwrap().tunnel_target(false).unwrap(),
                Step::LayerProtocol => state.as_mut().unwrap().layer_protocol(true).unwrap(),
                Step::Complete | Step::Unreachable => break,
            }
            assert!(steps.len() <= 4, "no convergence: {steps:?}");
        }

        steps
    }

    #[test]
    fn test_direct_plain() {
        let route = Route::direct(target(), false);
        assert_eq!(walk(&route), vec![Step::ConnectTarget, Step::Complete]);
    }

    #[test]
    fn test_direct_secure_is_secured_on_connect() {
        let route = Route::direct(target(), true);
        assert_eq!(walk(&route), vec![Step::ConnectTarget, Step::Complete]);
    }

    #[test]
    fn test_proxy_without_tunnel() {
        let route = Route::proxied(target(), proxy(), false);
        assert_eq!(walk(&route), vec![Step::ConnectProxy, Step::Complete]);
    }

    #[test]
    fn test_plain_tunnel_through_proxy() {
        let route = Route::with_layout(
            target(),
            Some(proxy()),
            TunnelType::Tunnelled,
            LayerType::Plain,
            false,
        )
        .unwrap();
        assert_eq!(
            walk(&route),
            vec![Step::ConnectProxy, Step::CreateTunnel, Step::Complete]
        );
    }

    #[test]
    fn test_secure_through_proxy() {
        let route = Route::proxied(target(), proxy(), true);
        assert_eq!(
            walk(&route),
            vec![
                Step::ConnectProxy,
                Step::CreateTunnel,
                Step::LayerProtocol,
                Step::Complete
            ]
        );
    }

    #[test]
    fn test_next_step_is_deterministic() {
        let director = RouteDirector;
        let route = Route::proxied(target(), proxy(), true);
        let mut state = RouteState::new(target());
        state.connect_proxy(proxy(), false).unwrap();

        let first = director.next_step(&route, Some(&state));
        for _ in 0..10 {
            assert_eq!(director.next_step(&route, Some(&state)), first);
        }
        assert_eq!(first, Step::CreateTunnel);
    }

    #[test]
    fn test_unconnected_state_starts_over() {
        let director = RouteDirector;
        let route = Route::direct(target(), false);
        let state = RouteState::new(target());
        assert_eq!(director.next_step(&route, Some(&state)), Step::ConnectTarget);
    }

    #[test]
    fn test_unreachable_states() {
        let director = RouteDirector;

        // connected to a different target
        let mut other = RouteState::new(HttpHost::new("other.example", 443));
        other.connect_target(false).unwrap();
        assert_eq!(
            director.next_step(&Route::direct(target(), false), Some(&other)),
            Step::Unreachable
        );

        // direct plan, proxied connection
        let mut via_proxy = RouteState::new(target());
        via_proxy.connect_proxy(proxy(), false).unwrap();
        assert_eq!(
            director.next_step(&Route::direct(target(), false), Some(&via_proxy)),
            Step::Unreachable
        );

        // proxied plan, direct connection
        let mut direct = RouteState::new(target());
        direct.connect_target(false).unwrap();
        assert_eq!(
            director.next_step(&Route::proxied(target(), proxy(), true), Some(&direct)),
            Step::Unreachable
        );

        // tunnelled where the plan forwards plainly
        let mut tunnelled = via_proxy.clone();
        tunnelled.tunnel_target(false).unwrap();
        assert_eq!(
            director.next_step(&Route::proxied(target(), proxy(), false), Some(&tunnelled)),
            Step::Unreachable
        );

        // security mismatch on a direct route
        let mut insecure = RouteState::new(target());
        insecure.connect_target(false).unwrap();
        assert_eq!(
            director.next_step(&Route::direct(target(), true), Some(&insecure)),
            Step::Unreachable
        );

        // tunnel and layer done, yet still not secure
        let mut layered_plain = via_proxy;
        layered_plain.tunnel_target(false).unwrap();
        layered_plain.layer_protocol(false).unwrap();
        assert_eq!(
            director.next_step(&Route::proxied(target(), proxy(), true), Some(&layered_plain)),
            Step::Unreachable
        );
    }

    #[test]
    fn test_step_is_action() {
        assert!(Step::ConnectTarget.is_action());
        assert!(Step::LayerProtocol.is_action());
        assert!(!Step::Complete.is_action());
        assert!(!Step::Unreachable.is_action());
    }
}
