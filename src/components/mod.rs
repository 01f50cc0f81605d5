pub mod agent_graph;
