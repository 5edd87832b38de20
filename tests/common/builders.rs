//! Test data builders for populating catalogs

use tensor_prefetch::catalog::{InMemoryCatalog, OutputVariableInfo};

/// Builder for an [`InMemoryCatalog`] describing one node
pub struct CatalogBuilder {
    graph_id: i32,
    node_name: String,
    variable_inputs: Vec<usize>,
    variable_outputs: Vec<usize>,
    outputs_needing_copy: Vec<usize>,
    prefetched_inputs: Option<Vec<usize>>,
}

impl CatalogBuilder {
    pub fn new(graph_id: i32, node_name: &str) -> Self {
        Self {
            graph_id,
            node_name: node_name.to_string(),
            variable_inputs: Vec::new(),
            variable_outputs: Vec::new(),
            outputs_needing_copy: Vec::new(),
            prefetched_inputs: None,
        }
    }

    pub fn variable_inputs(mut self, indexes: &[usize]) -> Self {
        self.variable_inputs = indexes.to_vec();
        self
    }

    pub fn variable_outputs(mut self, indexes: &[usize]) -> Self {
        self.variable_outputs = indexes.to_vec();
        self
    }

    pub fn outputs_needing_copy(mut self, indexes: &[usize]) -> Self {
        self.outputs_needing_copy = indexes.to_vec();
        self
    }

    pub fn prefetched_inputs(mut self, indexes: &[usize]) -> Self {
        self.prefetched_inputs = Some(indexes.to_vec());
        self
    }

    pub fn build(self) -> InMemoryCatalog {
        let catalog = InMemoryCatalog::new();
        for &index in &self.variable_inputs {
            catalog.add_input_variable(self.graph_id, &self.node_name, index, "abc");
        }
        for &index in &self.variable_outputs {
            catalog.add_output_variable_info(
                self.graph_id,
                &self.node_name,
                index,
                OutputVariableInfo {
                    shared_name: "abc".to_string(),
                    copy_to_host: true,
                },
            );
        }
        catalog.add_output_copy_indexes(
            self.graph_id,
            &self.node_name,
            self.outputs_needing_copy.iter().copied(),
        );
        if let Some(prefetched) = self.prefetched_inputs {
            catalog.add_prefetched_input_indexes(self.graph_id, &self.node_name, prefetched);
        }
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_prefetch::Catalog;

    #[test]
    fn test_catalog_builder() {
        let catalog = CatalogBuilder::new(1, "xyz_1")
            .variable_inputs(&[0])
            .outputs_needing_copy(&[1])
            .prefetched_inputs(&[2])
            .build();

        assert!(catalog.exists_variable_input(1, "xyz_1", 0));
        assert!(catalog.output_needs_copy(1, "xyz_1", 1));
        assert_eq!(catalog.prefetch_index_set(1, "xyz_1"), vec![2]);
    }
}
